//! Configuração do nó via TOML.
//!
//! As constantes da build do firmware (id, destino, porta, intervalo,
//! transporte, slots ativos) viram um único `config.toml`.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::cipher::{DeviceKey, KeyError};
use crate::queue::DEFAULT_CAPACITY;
use crate::record::{MAX_SLOTS, TimestampPolicy};
use crate::transport::{Transport, TransportError, TransportKind, build_transport};
use crate::uplink::DeviceProfile;

/// Chave padrão: só serve para bancada. `validate` avisa quando está em uso.
pub const DEFAULT_KEY_HEX: &str = "00000000000000000000000000000000";

/// Erros de configuração.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IP de destino inválido: {0:?}")]
    InvalidDestination(String),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Erro ao serializar configuração: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Erro ao gravar {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Identidade e forma do registro do dispositivo.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Identificador do dispositivo (1–255)
    pub device_id: u16,
    /// Intervalo entre ciclos em segundos
    pub interval_secs: u64,
    /// "shared" ou "per_field"
    pub timestamps: TimestampPolicy,
    /// Slots de sensor ativos (1–10)
    pub slot_count: usize,
    /// Capacidade da fila de reenvio
    pub retry_capacity: usize,
    /// Chave AES-128 em hex (32 dígitos)
    pub key_hex: String,
    /// Arquivo binário de 16 bytes; tem precedência sobre `key_hex`
    pub key_file: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            device_id: 1,
            interval_secs: 300,
            timestamps: TimestampPolicy::Shared,
            slot_count: 4,
            retry_capacity: DEFAULT_CAPACITY,
            key_hex: DEFAULT_KEY_HEX.into(),
            key_file: None,
        }
    }
}

/// Destino e estratégia de entrega.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// "datagram" ou "stream"
    pub kind: TransportKind,
    /// IP de destino
    pub dest_ip: String,
    /// Porta de destino
    pub port: u16,
    /// Timeout de conexão stream em ms (0 = espera indefinida)
    pub connect_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Datagram,
            dest_ip: "127.0.0.1".into(),
            port: 5005,
            connect_timeout_ms: 0,
        }
    }
}

impl TransportConfig {
    pub fn destination(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .dest_ip
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidDestination(self.dest_ip.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_ms > 0).then(|| Duration::from_millis(self.connect_timeout_ms))
    }

    pub fn build(&self) -> Result<Box<dyn Transport>, ConfigError> {
        Ok(build_transport(self.kind, self.destination()?, self.connect_timeout())?)
    }
}

/// Configuração raiz do nó.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub node: NodeConfig,
    pub transport: TransportConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let node = &self.node;

        if node.device_id == 0 || node.device_id > 255 {
            errors.push(format!("device_id inválido: {} (1–255)", node.device_id));
        }
        if node.interval_secs == 0 {
            errors.push("Intervalo do nó não pode ser 0".into());
        }
        if node.slot_count == 0 || node.slot_count > MAX_SLOTS {
            errors.push(format!(
                "slot_count inválido: {} (1–{MAX_SLOTS})",
                node.slot_count
            ));
        }
        if node.retry_capacity == 0 {
            errors.push("Capacidade da fila de reenvio não pode ser 0".into());
        }
        if node.key_file.is_none() {
            if let Err(e) = DeviceKey::from_hex(&node.key_hex) {
                errors.push(e.to_string());
            }
        }
        if self.transport.port == 0 {
            errors.push("Porta de destino não pode ser 0".into());
        }
        if let Err(e) = self.transport.destination() {
            errors.push(e.to_string());
        }

        errors
    }

    /// Carrega a chave: `key_file` se definido, senão `key_hex`.
    pub fn device_key(&self) -> Result<DeviceKey, ConfigError> {
        let key = match &self.node.key_file {
            Some(path) => DeviceKey::from_file(path)?,
            None => {
                if self.node.key_hex.trim() == DEFAULT_KEY_HEX {
                    warn!("Usando chave padrão (zeros); configure key_hex ou key_file");
                }
                DeviceKey::from_hex(&self.node.key_hex)?
            }
        };
        Ok(key)
    }

    pub fn profile(&self) -> DeviceProfile {
        DeviceProfile {
            device_id: self.node.device_id,
            slot_count: self.node.slot_count,
            timestamps: self.node.timestamps,
        }
    }
}
