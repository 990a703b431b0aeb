//! Output directory and file name resolution.
//!
//! Automatic mode always produces
//! `<project>/Resources/<stem>/baked_maps/<stem>_<label>.png` with a lower
//! case label. Custom mode composes the directory from a base plus the
//! optional object folder and subfolder, and applies the configured case and
//! separators to the file name.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{BakeConfiguration, NamingCase, OutputMode};
use crate::map_type::MapType;

/// Directory every project-relative layout is rooted in.
pub const RESOURCES_DIR: &str = "Resources";
/// Subfolder used by automatic mode.
pub const AUTOMATIC_SUBFOLDER: &str = "baked_maps";
/// Extension of every baked map.
pub const MAP_EXTENSION: &str = "png";

const AUTOMATIC_SEPARATOR: &str = "_";
const PASCAL_SPLIT_SEPARATOR: &str = ".";

static TRAILING_JUNK_REGEX: OnceLock<Regex> = OnceLock::new();

fn trailing_junk_regex() -> &'static Regex {
    TRAILING_JUNK_REGEX.get_or_init(|| Regex::new(r"[^a-zA-Z0-9]+$").expect("invalid regex pattern"))
}

/// Names of the objects taking part in a bake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectNames {
    pub source: Option<String>,
    pub target: String,
}

impl ObjectNames {
    /// Names for a single-object bake.
    pub fn target(target: impl Into<String>) -> Self {
        Self {
            source: None,
            target: target.into(),
        }
    }

    /// Names for a selected-to-active bake.
    pub fn pair(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            target: target.into(),
        }
    }

    /// Names as configured, if a target is present.
    pub fn from_config(config: &BakeConfiguration) -> Option<Self> {
        let target = config.target_object.clone()?;
        Some(Self {
            source: config.active_source().map(str::to_string),
            target,
        })
    }
}

/// A resolved output location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedOutput {
    pub directory: PathBuf,
    pub file_name: String,
}

impl ResolvedOutput {
    /// Full path of the output file.
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }

    /// Creates the output directory if it does not exist.
    pub fn create_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.directory)
    }
}

/// Longest common leading substring of two names with trailing
/// non-alphanumeric characters removed.
///
/// ```
/// assert_eq!(xbake_spec::naming::common_stem("Rock_High", "Rock_Low"), "Rock");
/// ```
pub fn common_stem(a: &str, b: &str) -> String {
    let prefix_len: usize = a
        .chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .map(|(c, _)| c.len_utf8())
        .sum();
    trailing_junk_regex()
        .replace(&a[..prefix_len], "")
        .into_owned()
}

/// Applies a naming case to a label whose words are joined by `split_separator`.
///
/// Pascal case re-joins the capitalized words with `join_separator`.
pub fn apply_case(
    label: &str,
    case: NamingCase,
    split_separator: &str,
    join_separator: &str,
) -> String {
    match case {
        NamingCase::Lower => label.to_lowercase(),
        NamingCase::Upper => label.to_string(),
        NamingCase::Pascal => {
            let words: Vec<String> = if split_separator.is_empty() {
                vec![capitalize(label)]
            } else {
                label
                    .split(split_separator)
                    .filter(|w| !w.is_empty())
                    .map(capitalize)
                    .collect()
            };
            let joined = words.join(join_separator);
            if join_separator.is_empty() {
                joined
            } else {
                joined.trim_end_matches(join_separator).to_string()
            }
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Resolves output locations for one configuration and project.
#[derive(Debug, Clone)]
pub struct OutputPathResolver<'a> {
    config: &'a BakeConfiguration,
    project_root: PathBuf,
}

impl<'a> OutputPathResolver<'a> {
    /// Creates a resolver rooted at `project_root`.
    pub fn new(config: &'a BakeConfiguration, project_root: impl AsRef<Path>) -> Self {
        Self {
            config,
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    /// Returns the name stem for a set of objects.
    pub fn stem(&self, names: &ObjectNames) -> String {
        let output = &self.config.output;
        if output.mode == OutputMode::Custom && output.use_custom_name {
            return output.custom_name.clone();
        }

        match (self.config.is_selected_to_active(), names.source.as_deref()) {
            (true, Some(source)) if !source.is_empty() => {
                let stem = common_stem(source, &names.target);
                if stem.is_empty() {
                    names.target.clone()
                } else {
                    stem
                }
            }
            _ => names.target.clone(),
        }
    }

    /// Returns the output directory for a stem.
    pub fn directory(&self, stem: &str) -> PathBuf {
        let output = &self.config.output;
        match output.mode {
            OutputMode::Automatic => self
                .project_root
                .join(RESOURCES_DIR)
                .join(stem)
                .join(AUTOMATIC_SUBFOLDER),
            OutputMode::Custom => {
                let mut dir = match (&output.directory, output.use_custom_path) {
                    (Some(dir), true) => dir.clone(),
                    _ => self.project_root.join(RESOURCES_DIR),
                };
                if output.use_object_folder {
                    dir.push(stem);
                }
                if output.use_subfolder && !output.subfolder_name.is_empty() {
                    dir.push(&output.subfolder_name);
                }
                dir
            }
        }
    }

    /// Returns the case-transformed label for a map type.
    pub fn label(&self, map_type: MapType) -> String {
        let naming = &self.config.naming;
        match self.config.output.mode {
            OutputMode::Automatic => apply_case(
                &map_type.label(AUTOMATIC_SEPARATOR),
                NamingCase::Lower,
                AUTOMATIC_SEPARATOR,
                AUTOMATIC_SEPARATOR,
            ),
            OutputMode::Custom => {
                let split = match naming.case {
                    NamingCase::Pascal => PASCAL_SPLIT_SEPARATOR,
                    _ => naming.label_separator.as_str(),
                };
                apply_case(
                    &map_type.label(split),
                    naming.case,
                    split,
                    &naming.label_separator,
                )
            }
        }
    }

    /// Returns the file name for a map type and stem.
    pub fn file_name(&self, map_type: MapType, stem: &str) -> String {
        let separator = match self.config.output.mode {
            OutputMode::Automatic => AUTOMATIC_SEPARATOR,
            OutputMode::Custom => self.config.naming.name_separator.as_str(),
        };
        format!(
            "{}{}{}.{}",
            stem,
            separator,
            self.label(map_type),
            MAP_EXTENSION
        )
    }

    /// Resolves the directory and file name for one map.
    pub fn resolve(&self, map_type: MapType, names: &ObjectNames) -> ResolvedOutput {
        let stem = self.stem(names);
        ResolvedOutput {
            directory: self.directory(&stem),
            file_name: self.file_name(map_type, &stem),
        }
    }
}
