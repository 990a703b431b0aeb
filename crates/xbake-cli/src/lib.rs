//! xBake CLI library.
//!
//! Command implementations behind the `xbake` binary: baking a lowpoly /
//! highpoly pair in Blender, printing a job plan, and checking the local
//! setup.

pub mod commands;
