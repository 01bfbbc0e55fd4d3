//! Page bundle parsing and validation.
//!
//! Bundles are YAML by default; files ending in `.json` are read as JSON.
//! Validation checks structural constraints the engine otherwise only
//! discovers mid-cascade:
//! - Node ids must be unique within the instance
//! - Value/Visible/Style descriptors must address a known node
//! - `dependents` and style links must name known variables
//! - Placement rules must reference known nodes

use super::engine::dependents;
use super::types::*;
use crate::surface::memory::NodeSpec;
use std::collections::HashSet;
use std::path::Path;

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Parse a page bundle file from disk.
pub fn parse_bundle_file(path: &Path) -> Result<PageBundle, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&content).map_err(|e| format!("JSON parse error: {}", e))
    } else {
        parse_bundle(&content)
    }
}

/// Parse a YAML page bundle from a string.
pub fn parse_bundle(yaml: &str) -> Result<PageBundle, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

/// Validate a parsed bundle. Returns a list of errors (empty = valid).
pub fn validate_bundle(bundle: &PageBundle) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut error = |message: String| errors.push(ValidationError { message });

    if bundle.instance.trim().is_empty() {
        error("instance must not be empty".to_string());
    }
    if bundle.options.max_cascade_depth == 0 {
        error("options.max_cascade_depth must be at least 1".to_string());
    }

    // Node ids
    let mut ids = Vec::new();
    collect_ids(&bundle.nodes, &mut ids);
    let mut known = HashSet::new();
    for id in &ids {
        if !known.insert(id.as_str()) {
            error(format!("duplicate node id '{}'", id));
        }
    }

    for (name, variable) in &bundle.variables {
        for (target, descriptors) in &variable.dependencies {
            for descriptor in descriptors {
                let addresses_node = !matches!(descriptor.dependency_type, DependencyType::Variable);
                if addresses_node && !known.contains(target.as_str()) {
                    error(format!(
                        "variable '{}' has a {} descriptor for unknown node '{}'",
                        name, descriptor.dependency_type, target
                    ));
                }

                if descriptor.dependency_type == DependencyType::Style
                    && descriptor.condition.is_none()
                {
                    for dependent in dependents(descriptor) {
                        if !bundle.variables.contains_key(&dependent) {
                            error(format!(
                                "variable '{}' shares style with unknown variable '{}'",
                                name, dependent
                            ));
                        }
                    }
                }

                if descriptor.dependency_type == DependencyType::Variable
                    && descriptor.condition.is_none()
                    && target == STYLE_FORWARD_TARGET
                {
                    for (property, parameter) in &descriptor.parameters {
                        match serde_json::from_str::<StyleLink>(&parameter.value.value) {
                            Ok(link) if !bundle.variables.contains_key(&link.variable) => {
                                error(format!(
                                    "variable '{}' forwards '{}' to unknown variable '{}'",
                                    name, property, link.variable
                                ))
                            }
                            Ok(_) => {}
                            Err(e) => error(format!(
                                "variable '{}' has a malformed style link for '{}': {}",
                                name, property, e
                            )),
                        }
                    }
                }
            }
        }
    }

    // Placement rules
    for (object, rules) in &bundle.external_children {
        for rule in rules {
            if !known.contains(rule.set_at.as_str()) {
                error(format!(
                    "external child '{}' placed at unknown node '{}'",
                    object, rule.set_at
                ));
            }
            for target in &rule.condition {
                if !known.contains(target.as_str()) {
                    error(format!(
                        "external child '{}' conditioned on unknown node '{}'",
                        object, target
                    ));
                }
            }
        }
    }

    errors
}

fn collect_ids(nodes: &[NodeSpec], out: &mut Vec<String>) {
    for node in nodes {
        if let Some(id) = &node.id {
            out.push(id.clone());
        }
        collect_ids(&node.children, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn messages(bundle: &PageBundle) -> Vec<String> {
        validate_bundle(bundle)
            .into_iter()
            .map(|e| e.message)
            .collect()
    }

    #[test]
    fn test_parse_valid() {
        let yaml = r#"
instance: main
variables:
  open:
    value: "false"
    dependencies:
      panel: [{dependency_type: Visible, condition: "true"}]
nodes:
  - id: panel
    display: none
"#;
        let bundle = parse_bundle(yaml).unwrap();
        assert_eq!(bundle.instance, "main");
        let errors = messages(&bundle);
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    }

    #[test]
    fn test_parse_error_message() {
        let err = parse_bundle("variables: [").unwrap_err();
        assert!(err.starts_with("YAML parse error"));
    }

    #[test]
    fn test_duplicate_node_id() {
        let yaml = r#"
nodes:
  - id: a
    children:
      - id: a
"#;
        let errors = messages(&parse_bundle(yaml).unwrap());
        assert!(errors.iter().any(|m| m.contains("duplicate node id 'a'")));
    }

    #[test]
    fn test_unknown_descriptor_node() {
        let yaml = r#"
variables:
  title:
    value: ""
    dependencies:
      heading: [{dependency_type: Value}]
      ctx: [{dependency_type: Variable, condition: "x"}]
"#;
        let errors = messages(&parse_bundle(yaml).unwrap());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Value descriptor for unknown node 'heading'"));
    }

    #[test]
    fn test_unknown_dependent_and_style_link() {
        let yaml = r#"
variables:
  base:
    value: red
    dependencies:
      box:
        - dependency_type: Style
          parameters:
            dependents: {value: {value: '["ghost"]'}}
            color: {}
  accent:
    value: red
    dependencies:
      "$style$":
        - dependency_type: Variable
          parameters:
            color: {value: {value: '{"$node$": "box", "$variable$": "phantom"}'}}
            border: {value: {value: 'nope'}}
nodes:
  - id: box
"#;
        let errors = messages(&parse_bundle(yaml).unwrap());
        assert!(errors.iter().any(|m| m.contains("unknown variable 'ghost'")));
        assert!(errors.iter().any(|m| m.contains("unknown variable 'phantom'")));
        assert!(errors.iter().any(|m| m.contains("malformed style link for 'border'")));
    }

    #[test]
    fn test_placement_references() {
        let yaml = r#"
external_children:
  ad:
    - condition: [wide]
      set_at: sidebar
nodes:
  - id: sidebar
"#;
        let errors = messages(&parse_bundle(yaml).unwrap());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("conditioned on unknown node 'wide'"));
    }

    #[test]
    fn test_options_and_instance() {
        let yaml = r#"
instance: ""
options:
  max_cascade_depth: 0
"#;
        let errors = messages(&parse_bundle(yaml).unwrap());
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_parse_bundle_file_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();

        let yaml_path = dir.path().join("page.yaml");
        std::fs::write(&yaml_path, "instance: side\n").unwrap();
        assert_eq!(parse_bundle_file(&yaml_path).unwrap().instance, "side");

        let json_path = dir.path().join("page.json");
        let mut f = std::fs::File::create(&json_path).unwrap();
        write!(
            f,
            r#"{{"variables": {{"x": {{"value": "1", "dependencies": {{"t": "[]"}}}}}}}}"#
        )
        .unwrap();
        let bundle = parse_bundle_file(&json_path).unwrap();
        assert_eq!(bundle.instance, "main");
        assert!(bundle.variables["x"].dependencies["t"].is_empty());
    }

    #[test]
    fn test_parse_bundle_file_missing() {
        let err = parse_bundle_file(Path::new("/nonexistent/page.yaml")).unwrap_err();
        assert!(err.contains("failed to read"));
    }
}
