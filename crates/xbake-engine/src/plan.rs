//! Job planning.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use xbake_spec::{
    BakeConfiguration, BitDepth, DerivedChannel, MapType, ObjectNames, OutputPathResolver,
    ResolvedOutput,
};

use crate::session::BakePass;

/// One bake job: a single enabled map type and where it is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BakeJob {
    /// Position in the run, starting at 0.
    pub index: usize,
    pub map_type: MapType,
    pub output: ResolvedOutput,
    /// Renderer pass, `None` for the UV layout export.
    pub pass: Option<BakePass>,
    /// Channel synthesized through a temporary graph.
    pub derived: Option<DerivedChannel>,
    pub lit: bool,
    pub bit_depth: BitDepth,
}

impl BakeJob {
    /// Full output path.
    pub fn path(&self) -> PathBuf {
        self.output.path()
    }

    /// Returns true if the job builds a derived-channel graph.
    pub fn requires_graph(&self) -> bool {
        self.derived.is_some()
    }
}

/// Returns the jobs for every enabled map, in map type order.
pub fn plan_jobs(
    config: &BakeConfiguration,
    names: &ObjectNames,
    project_root: &Path,
) -> Vec<BakeJob> {
    let resolver = OutputPathResolver::new(config, project_root);
    config
        .enabled_maps()
        .enumerate()
        .map(|(index, map_type)| BakeJob {
            index,
            map_type,
            output: resolver.resolve(map_type, names),
            pass: BakePass::for_map(map_type),
            derived: map_type.derived_channel(),
            lit: map_type.is_lit(),
            bit_depth: map_type.bit_depth(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use xbake_spec::BakeMode;

    #[test]
    fn test_jobs_follow_map_order() {
        let config = BakeConfiguration::builder()
            .target("Rock_Low")
            .source("Rock_High")
            .map(MapType::Glossy)
            .map(MapType::Uv)
            .map(MapType::Normal)
            .map(MapType::Position)
            .build();
        let jobs = plan_jobs(
            &config,
            &ObjectNames::pair("Rock_High", "Rock_Low"),
            Path::new("/p"),
        );

        let order: Vec<_> = jobs.iter().map(|j| (j.index, j.map_type)).collect();
        assert_eq!(
            order,
            vec![
                (0, MapType::Normal),
                (1, MapType::Uv),
                (2, MapType::Position),
                (3, MapType::Glossy),
            ]
        );
        assert!(jobs[2].requires_graph());
        assert_eq!(jobs[2].bit_depth, BitDepth::Sixteen);
        assert_eq!(jobs[1].pass, None);
        assert!(jobs[3].lit);
    }

    #[test]
    fn test_job_paths() {
        let config = BakeConfiguration::builder()
            .target("Prop01")
            .mode(BakeMode::SingleObject)
            .map(MapType::Normal)
            .build();
        let jobs = plan_jobs(&config, &ObjectNames::target("Prop01"), Path::new("/project"));
        assert_eq!(
            jobs[0].path(),
            PathBuf::from("/project/Resources/Prop01/baked_maps/Prop01_normal.png")
        );
    }
}
