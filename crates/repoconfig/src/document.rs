//! In-memory merge of package descriptors into a configuration document.
//!
//! The document is an arbitrary JSON object. Only two entries are touched:
//!
//! - `repositories`: an array of `{"type", "url", ...}` objects, keyed by `url`.
//! - `require`: an object mapping package names to version constraints.
//!
//! Every other entry is preserved as-is.

use domain::{ConfigMergeError, PackageDescriptor};
use serde_json::{Map, Value};

const REPOSITORIES: &str = "repositories";
const REQUIRE: &str = "require";

/// Parses `data` as a configuration document.
pub fn parse(data: &[u8]) -> Result<Map<String, Value>, ConfigMergeError> {
    let value: Value = serde_json::from_slice(data)
        .map_err(|e| ConfigMergeError::InvalidJson(e.to_string()))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ConfigMergeError::NotAnObject),
    }
}

/// Encodes a configuration document as 2-space-indented JSON.
///
/// Keys are emitted in sorted order.
pub fn encode(document: &Map<String, Value>) -> Result<String, ConfigMergeError> {
    serde_json::to_string_pretty(document).map_err(|e| ConfigMergeError::Encode(e.to_string()))
}

/// Merges `updates` into `document`.
///
/// A repository whose `url` matches a descriptor has its `type` overwritten;
/// otherwise a new `{"type", "url"}` entry is appended. A descriptor carrying
/// both a name and a version records `require[name] = version`. The `require`
/// entry is only written when it ends up non-empty.
pub fn merge(
    document: &mut Map<String, Value>,
    updates: &[PackageDescriptor],
) -> Result<(), ConfigMergeError> {
    let mut repositories = read_repositories(document)?;
    let mut requires = read_requires(document)?;

    for update in updates {
        let existing = repositories
            .iter_mut()
            .find(|repo| repo.get("url").and_then(Value::as_str) == Some(update.url.as_str()));

        match existing {
            Some(repo) => {
                repo.insert("type".to_string(), Value::from(update.kind.as_str()));
            }
            None => {
                let mut repo = Map::new();
                repo.insert("url".to_string(), Value::from(update.url.as_str()));
                repo.insert("type".to_string(), Value::from(update.kind.as_str()));
                repositories.push(repo);
            }
        }

        if let (Some(name), Some(version)) = (&update.name, &update.version) {
            requires.insert(name.to_string(), Value::from(version.as_str()));
        }
    }

    document.insert(
        REPOSITORIES.to_string(),
        Value::Array(repositories.into_iter().map(Value::Object).collect()),
    );
    if !requires.is_empty() {
        document.insert(REQUIRE.to_string(), Value::Object(requires));
    }

    Ok(())
}

fn read_repositories(
    document: &Map<String, Value>,
) -> Result<Vec<Map<String, Value>>, ConfigMergeError> {
    let Some(entry) = document.get(REPOSITORIES) else {
        return Ok(Vec::new());
    };
    let Value::Array(items) = entry else {
        return Err(ConfigMergeError::RepositoriesNotArray);
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(repo) => Ok(repo.clone()),
            _ => Err(ConfigMergeError::RepositoryNotObject(i)),
        })
        .collect()
}

fn read_requires(document: &Map<String, Value>) -> Result<Map<String, Value>, ConfigMergeError> {
    match document.get(REQUIRE) {
        None => Ok(Map::new()),
        Some(Value::Object(requires)) => Ok(requires.clone()),
        Some(_) => Err(ConfigMergeError::RequireNotObject),
    }
}
