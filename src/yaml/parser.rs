//! YAML parsing with error handling

use serde::de::DeserializeOwned;
use std::path::Path;

use crate::entities::project::ProjectFile;
use crate::yaml::diagnostics::{YamlError, YamlSyntaxError};

/// Parse YAML content into a typed value with source-located errors
pub fn parse_yaml<T: DeserializeOwned + 'static>(content: &str, filename: &str) -> Result<T, YamlError> {
    serde_yml::from_str(content).map_err(|e| {
        YamlError::Syntax(YamlSyntaxError::from_serde_error(&e, content, filename))
    })
}

/// Parse YAML from a file path
pub fn parse_yaml_file<T: DeserializeOwned + 'static>(path: &Path) -> Result<T, YamlError> {
    let content = std::fs::read_to_string(path)?;
    let filename = path.display().to_string();
    parse_yaml(&content, &filename)
}

/// Load a project file
pub fn load_project(path: &Path) -> Result<ProjectFile, YamlError> {
    parse_yaml_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::project::LimitState;

    #[test]
    fn test_parse_project() {
        let yaml = "stochasts:\n  - name: a\n    location: 1.0\n    scale: 1.0\nlimit_state:\n  type: linear\n  constant: 3.0\n  coefficients:\n    a: -1.0\n";
        let project: ProjectFile = parse_yaml(yaml, "test.yaml").unwrap();
        assert_eq!(project.stochasts.len(), 1);
        assert!(matches!(project.limit_state, LimitState::Linear { .. }));
    }

    #[test]
    fn test_unknown_limit_state_is_syntax_error() {
        let yaml = "stochasts: []\nlimit_state:\n  type: cubic\n";
        let result: Result<ProjectFile, _> = parse_yaml(yaml, "test.yaml");
        match result {
            Err(YamlError::Syntax(e)) => {
                assert!(e.message.contains("cubic"), "{}", e.message);
            }
            other => panic!("expected syntax error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_parse_invalid_yaml_returns_error() {
        let yaml = "stochasts: [\n  invalid";
        let result: Result<ProjectFile, _> = parse_yaml(yaml, "test.yaml");
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = load_project(Path::new("/nonexistent/project.yaml"));
        assert!(matches!(result, Err(YamlError::Io(_))));
    }
}
