//! Policy document loading and named-policy discovery.
//!
//! Policies live as YAML files in the configured policies directory
//! (`<data>/policies/*.yaml` by default). Jobs carry an inline snapshot of
//! the document they were enqueued with, so later edits to the file never
//! change an already-queued job.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::PolicyError;
use crate::policy::types::PolicyDocument;

/// Parses and validates a policy document from YAML text.
pub fn parse_policy(yaml: &str, origin: &Path) -> Result<PolicyDocument, PolicyError> {
    let document: PolicyDocument =
        serde_yaml::from_str(yaml).map_err(|source| PolicyError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
    document.validate()?;
    Ok(document)
}

/// Loads and validates a policy document from a file.
pub fn load_policy(path: &Path) -> Result<PolicyDocument, PolicyError> {
    let yaml = std::fs::read_to_string(path).map_err(|source| PolicyError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_policy(&yaml, path)
}

/// Resolves a policy name to a file in the policies directory. Accepts the
/// bare name (`default`) or a file name (`default.yaml`).
pub fn find_policy(policies_dir: &Path, name: &str) -> Result<PathBuf, PolicyError> {
    let candidates = [
        policies_dir.join(name),
        policies_dir.join(format!("{name}.yaml")),
        policies_dir.join(format!("{name}.yml")),
    ];
    for candidate in &candidates {
        if candidate.is_file() {
            debug!(policy = name, path = %candidate.display(), "resolved policy");
            return Ok(candidate.clone());
        }
    }
    Err(PolicyError::NotFound(name.to_string()))
}

/// Loads a named policy from the policies directory.
pub fn load_named_policy(policies_dir: &Path, name: &str) -> Result<PolicyDocument, PolicyError> {
    let path = find_policy(policies_dir, name)?;
    load_policy(&path)
}

/// Lists the names of every policy file in the directory, sorted.
pub fn list_policies(policies_dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(policies_dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let path = entry.path();
            let extension = path.extension()?.to_str()?;
            if extension == "yaml" || extension == "yml" {
                path.file_stem()?.to_str().map(String::from)
            } else {
                None
            }
        })
        .collect();
    names.sort();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
schema_version: 13
config:
  audio_language_preference: [eng, jpn]
  subtitle_language_preference: [eng]
  commentary_patterns: [commentary, director]
phases:
  - name: analyze
  - name: apply
  - name: transcode
    transcode:
      video:
        to: hevc
        crf: 22
        skip_if:
          codec_matches: [hevc, h265]
          resolution_within: 1080p
          bitrate_under: 10M
      audio:
        to: aac
        bitrate: 192k
workflow:
  phases: [analyze, apply, transcode]
  on_error: skip
"#;

    #[test]
    fn parses_and_validates_sample_policy() {
        let policy = parse_policy(SAMPLE, Path::new("sample.yaml")).unwrap();
        assert_eq!(policy.schema_version, 13);
        assert_eq!(policy.workflow.phases.len(), 3);
        let transcode = policy
            .phase(crate::policy::types::PhaseName::Transcode)
            .unwrap();
        let video = transcode.transcode.as_ref().unwrap().video.as_ref().unwrap();
        assert_eq!(video.to, "hevc");
        assert_eq!(video.crf, Some(22));
    }

    #[test]
    fn named_discovery_resolves_and_lists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("default.yaml"), SAMPLE).unwrap();
        std::fs::write(dir.path().join("anime.yml"), SAMPLE).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        assert!(find_policy(dir.path(), "default").is_ok());
        assert!(find_policy(dir.path(), "anime").is_ok());
        assert!(matches!(
            find_policy(dir.path(), "missing"),
            Err(PolicyError::NotFound(_))
        ));
        assert_eq!(list_policies(dir.path()), vec!["anime", "default"]);

        let policy = load_named_policy(dir.path(), "default").unwrap();
        assert_eq!(policy.schema_version, 13);
    }

    #[test]
    fn invalid_yaml_reports_parse_error() {
        let err = parse_policy("schema_version: [nope", Path::new("broken.yaml")).unwrap_err();
        assert!(matches!(err, PolicyError::Parse { .. }));
    }
}
