//! # Telemetry Node
//!
//! Loop sempre ativo do dispositivo: a cada intervalo lê os sensores, monta
//! o registro, cifra e envia; envios que falham vão para a fila de reenvio.
//!
//! ## Uso
//! ```bash
//! telemetry_node                     # usa config.toml ao lado do executável
//! telemetry_node /etc/node.toml      # caminho explícito
//! ```

mod monitor;

use monitor::HostMonitor;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use telemetry_wire::config::AppConfig;
use telemetry_wire::{SystemClock, Uplink};
use tracing::{error, info, warn};

fn main() -> ExitCode {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Carregar config ──
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    let problems = config.validate();
    if !problems.is_empty() {
        for p in &problems {
            error!("Configuração inválida: {p}");
        }
        return ExitCode::FAILURE;
    }

    let key = match config.device_key() {
        Ok(key) => key,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let transport = match config.transport.build() {
        Ok(t) => t,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let node_cfg = &config.node;
    let profile = config.profile();
    let interval = Duration::from_secs(node_cfg.interval_secs);
    let mut uplink = Uplink::new(profile, &key, transport, node_cfg.retry_capacity);

    // ── Sensores ──
    let mut hw = HostMonitor::new();
    info!("Monitor do host inicializado");

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   ⚡ TELEMETRY NODE – ATIVO");
    println!("══════════════════════════════════════════════");
    println!("  Dispositivo: {}", profile.device_id);
    println!("  Destino:     {} ({})", uplink.transport().destination(), config.transport.kind);
    println!("  Registro:    {} slots / {} bytes", profile.slot_count, profile.payload_len());
    println!("  Intervalo:   {}s", node_cfg.interval_secs);
    println!("══════════════════════════════════════════════");
    println!();

    // ── Loop principal ──
    loop {
        let cycle_start = Instant::now();

        hw.refresh();
        match uplink.run_cycle(&mut hw, &SystemClock) {
            Ok(report) if report.delivered => info!(
                "Registro enviado | reenviados {} | pendentes {}",
                report.resent, report.backlog
            ),
            Ok(report) => warn!(
                "Registro enfileirado | pendentes {}{}",
                report.backlog,
                if report.evicted { " | mais antigo descartado" } else { "" }
            ),
            // já registrado no ciclo; tenta de novo no próximo tick
            Err(_) => {}
        }

        // Dormir pelo tempo restante do intervalo
        let elapsed = cycle_start.elapsed();
        if elapsed < interval {
            std::thread::sleep(interval - elapsed);
        }
    }
}
