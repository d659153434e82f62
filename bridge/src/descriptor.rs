use std::path::{Path, PathBuf};

use engine::{EngineOptions, Protocol};
use serde::{Deserialize, Serialize};

use crate::BridgeError;

/// A known engine: where it lives, what it speaks, how to configure it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineDescriptor {
    pub name: String,
    pub path: PathBuf,
    #[serde(default = "default_protocol")]
    pub protocol: Protocol,
    #[serde(default)]
    pub options: EngineOptions,
    /// Personality commands replayed after a legacy engine's handshake.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub init_commands: Vec<String>,
}

fn default_protocol() -> Protocol {
    Protocol::Modern
}

impl EngineDescriptor {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, protocol: Protocol) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            protocol,
            options: EngineOptions::default(),
            init_commands: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_init_commands(mut self, commands: Vec<String>) -> Self {
        self.init_commands = commands;
        self
    }
}

/// Known engines, keyed by unique name. Serializes as `{"engines": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineRegistry {
    #[serde(default)]
    engines: Vec<EngineDescriptor>,
}

impl EngineRegistry {
    /// Read a registry file. A missing file is an empty registry.
    pub fn load(path: &Path) -> Result<Self, BridgeError> {
        if !path.exists() {
            tracing::debug!("No registry at {:?}, starting empty", path);
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let registry: Self = serde_json::from_str(&contents)?;
        tracing::info!("Loaded {} engines from {:?}", registry.len(), path);
        Ok(registry)
    }

    pub fn save(&self, path: &Path) -> Result<(), BridgeError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Register an engine. The executable must exist and the name be unused.
    pub fn add(&mut self, descriptor: EngineDescriptor) -> Result<(), BridgeError> {
        if !descriptor.path.exists() {
            return Err(BridgeError::MissingExecutable(descriptor.path));
        }
        if self.get(&descriptor.name).is_some() {
            return Err(BridgeError::DuplicateEngine(descriptor.name));
        }
        self.engines.push(descriptor);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<EngineDescriptor> {
        let index = self.engines.iter().position(|e| e.name == name)?;
        Some(self.engines.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<&EngineDescriptor> {
        self.engines.iter().find(|e| e.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut EngineDescriptor> {
        self.engines.iter_mut().find(|e| e.name == name)
    }

    pub fn engines(&self) -> &[EngineDescriptor] {
        &self.engines
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::OptionValue;
    use tempfile::TempDir;

    #[test]
    fn test_reads_original_registry_shape() {
        let json = r#"{
            "engines": [
                {"name": "Stockfish", "path": "/usr/bin/stockfish", "protocol": "UCI",
                 "options": {"Threads": 4, "Skill Level": 10, "Contempt": 24, "MultiPV": 3}},
                {"name": "TheKing", "path": "C:/engines/TheKing350.exe", "protocol": "WinBoard",
                 "options": {}}
            ]
        }"#;
        let registry: EngineRegistry = serde_json::from_str(json).unwrap();
        assert_eq!(registry.len(), 2);

        let sf = registry.get("Stockfish").unwrap();
        assert_eq!(sf.protocol, Protocol::Modern);
        assert_eq!(sf.options.threads, Some(4));
        assert_eq!(sf.options.skill_level, Some(10));
        assert_eq!(sf.options.multi_pv, Some(3));
        assert_eq!(sf.options.extra.get("Contempt"), Some(&OptionValue::Int(24)));

        assert_eq!(registry.get("TheKing").unwrap().protocol, Protocol::Legacy);
    }

    #[test]
    fn test_protocol_defaults_to_modern() {
        let d: EngineDescriptor = serde_json::from_str(r#"{"name": "x", "path": "/x"}"#).unwrap();
        assert_eq!(d.protocol, Protocol::Modern);
        assert!(d.options.extra.is_empty());
        assert!(d.init_commands.is_empty());
    }

    #[test]
    fn test_add_requires_existing_executable() {
        let dir = TempDir::new().unwrap();
        let mut registry = EngineRegistry::default();

        let missing = EngineDescriptor::new("ghost", dir.path().join("ghost"), Protocol::Modern);
        assert!(matches!(
            registry.add(missing),
            Err(BridgeError::MissingExecutable(_))
        ));

        let path = dir.path().join("real");
        std::fs::write(&path, "").unwrap();
        registry
            .add(EngineDescriptor::new("real", &path, Protocol::Modern))
            .unwrap();
        assert!(matches!(
            registry.add(EngineDescriptor::new("real", &path, Protocol::Legacy)),
            Err(BridgeError::DuplicateEngine(_))
        ));
        assert_eq!(registry.len(), 1);

        assert!(registry.remove("real").is_some());
        assert!(registry.remove("real").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let exe = dir.path().join("engine");
        std::fs::write(&exe, "").unwrap();

        let mut options = EngineOptions::default();
        options.hash_mb = Some(512);
        let mut registry = EngineRegistry::default();
        registry
            .add(
                EngineDescriptor::new("mine", &exe, Protocol::Legacy)
                    .with_options(options)
                    .with_init_commands(vec!["option Style=Risky".into()]),
            )
            .unwrap();

        let file = dir.path().join("conf").join("engines.json");
        registry.save(&file).unwrap();
        let text = std::fs::read_to_string(&file).unwrap();
        assert!(text.contains("\"WinBoard\""));
        assert!(text.contains("\"Hash\": 512"));

        assert_eq!(EngineRegistry::load(&file).unwrap(), registry);
        assert!(EngineRegistry::load(&dir.path().join("absent.json"))
            .unwrap()
            .is_empty());
    }
}
