//! # Telemetry Emulator
//!
//! Emulador de referência: monta um único registro a partir da linha de
//! comando, carimba o tag, cifra e envia uma vez. Sem fila de reenvio.
//!
//! ## Uso
//! ```bash
//! telemetry_emulator datagram 5005 7 2150 -300 81234
//! telemetry_emulator stream 6000 7 100 200 --connect-timeout-ms 2000
//! ```
//!
//! ## Códigos de saída
//! | código | motivo                                           |
//! |--------|--------------------------------------------------|
//! | 0      | enviado                                          |
//! | 1      | uso incorreto, transporte desconhecido, chave    |
//! | 2      | reservado                                        |
//! | 3      | porta fora de 1–65535                            |
//! | 4      | device_id fora de 1–255                          |
//! | 5      | mais de 10 valores de sensor                     |
//! | 6      | falha ao preparar o socket, stream indisponível  |
//! | 7      | falha de conexão                                 |
//! | 8      | falha no envio                                   |
//! | 9      | falha interna de codificação                     |

use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;
use std::time::Duration;
use telemetry_wire::cipher::{BlockFramer, DeviceKey, KeyError};
use telemetry_wire::record::{Clock, MAX_SLOTS, SystemClock, TelemetryRecord, payload_len};
use telemetry_wire::tag::{self, KeySum};
use telemetry_wire::transport::{TransportError, TransportKind, UnknownTransport, build_transport};
use telemetry_wire::uplink::{EncodeError, seal};
use tracing::{debug, error, info};

/// Chave de referência da bancada (0x00..0x0f).
const REFERENCE_KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f";

#[derive(Parser, Debug)]
#[command(
    name = "telemetry_emulator",
    about = "Envia um registro de telemetria cifrado (emulador de dispositivo)",
    allow_negative_numbers = true
)]
struct Args {
    /// datagram|stream (udp|tcp também aceitos)
    transport: String,

    /// Porta de destino (1–65535)
    port: String,

    /// Identificador do dispositivo (1–255)
    device_id: String,

    /// Valores inteiros dos sensores, na ordem dos slots
    #[arg(required = true, num_args = 1..)]
    values: Vec<String>,

    /// IP de destino
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Chave AES-128 em hex (32 dígitos)
    #[arg(long, default_value = REFERENCE_KEY_HEX)]
    key: String,

    /// Timeout da conexão stream em ms (omitido = espera indefinida)
    #[arg(long)]
    connect_timeout_ms: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
enum EmulatorError {
    #[error(transparent)]
    Transport(#[from] UnknownTransport),

    #[error("Argumento inválido: {0}")]
    Usage(String),

    #[error("Chave inválida: {0}")]
    Key(#[from] KeyError),

    #[error("Porta incorreta: {0}")]
    Port(String),

    #[error("device_id incorreto: {0}")]
    DeviceId(String),

    #[error("Valores de sensor demais: {0} (máximo {MAX_SLOTS})")]
    TooManyValues(usize),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Send(#[from] TransportError),
}

impl EmulatorError {
    fn exit_code(&self) -> u8 {
        match self {
            EmulatorError::Transport(_) | EmulatorError::Usage(_) | EmulatorError::Key(_) => 1,
            EmulatorError::Port(_) => 3,
            EmulatorError::DeviceId(_) => 4,
            EmulatorError::TooManyValues(_) => 5,
            EmulatorError::Send(e) => match e {
                TransportError::Socket(_)
                | TransportError::NonBlocking(_)
                | TransportError::Unsupported(_) => 6,
                TransportError::Connect(_)
                | TransportError::Wait(_)
                | TransportError::TimedOut(_)
                | TransportError::PendingErrorQuery(_)
                | TransportError::PendingError(_) => 7,
                TransportError::Send(_) => 8,
            },
            EmulatorError::Encode(_) => 9,
        }
    }
}

/// Envio validado, pronto para codificar.
#[derive(Debug)]
struct Request {
    kind: TransportKind,
    dest: SocketAddr,
    device_id: u16,
    values: Vec<i32>,
    key: DeviceKey,
    connect_timeout: Option<Duration>,
}

/// Valida tudo antes de qualquer I/O de rede, na ordem transporte, porta,
/// device_id, quantidade de valores. Os valores só são convertidos depois,
/// então faixa e quantidade decidem o código de saída.
fn validate(args: Args) -> Result<Request, EmulatorError> {
    let kind: TransportKind = args.transport.parse()?;

    let port = parse_int(&args.port, "porta")?;
    if !(1..=65535).contains(&port) {
        return Err(EmulatorError::Port(args.port));
    }

    let device_id = parse_int(&args.device_id, "device_id")?;
    if !(1..=255).contains(&device_id) {
        return Err(EmulatorError::DeviceId(args.device_id));
    }

    if args.values.len() > MAX_SLOTS {
        return Err(EmulatorError::TooManyValues(args.values.len()));
    }

    let values = args
        .values
        .iter()
        .map(|v| {
            v.trim()
                .parse::<i32>()
                .map_err(|_| EmulatorError::Usage(format!("valor de sensor {v:?} não é um inteiro")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let ip: IpAddr = args
        .host
        .parse()
        .map_err(|_| EmulatorError::Usage(format!("host {:?}", args.host)))?;

    Ok(Request {
        kind,
        dest: SocketAddr::new(ip, port as u16),
        device_id: device_id as u16,
        values,
        key: DeviceKey::from_hex(&args.key)?,
        connect_timeout: args.connect_timeout_ms.map(Duration::from_millis),
    })
}

fn parse_int(text: &str, what: &str) -> Result<i64, EmulatorError> {
    text.trim()
        .parse()
        .map_err(|_| EmulatorError::Usage(format!("{what} {text:?} não é um inteiro")))
}

/// Monta, carimba e cifra o registro. Um único timestamp nos três campos.
fn encode(request: &Request, now: u32) -> Result<Vec<u8>, EncodeError> {
    let record = TelemetryRecord::from_values(request.device_id, &request.values, now);
    let len = payload_len(request.values.len());
    let key_sum = KeySum::new(&request.key);
    let framer = BlockFramer::new(&request.key);

    let encrypted = seal(&record, len, key_sum, &framer)?;
    if tracing::enabled!(tracing::Level::DEBUG) {
        let plain = framer.decrypt(&encrypted)?;
        debug!("Claro:   {}", hex::encode(&plain));
        debug!("Cifrado: {}", hex::encode(&encrypted));
        debug!("Tag confere: {}", tag::verify(&plain, key_sum));
    }
    Ok(encrypted)
}

fn run(args: Args) -> Result<usize, EmulatorError> {
    let request = validate(args)?;

    info!(
        "Enviando registro {} para {} | device_id {} | {} sensor(es): {:?}",
        request.kind,
        request.dest,
        request.device_id,
        request.values.len(),
        request.values
    );

    let encrypted = encode(&request, SystemClock.unix_now())?;
    let mut transport = build_transport(request.kind, request.dest, request.connect_timeout)?;
    let sent = transport.send(&encrypted)?;
    info!("Mensagem enviada ({sent} bytes)");
    Ok(sent)
}

fn main() -> ExitCode {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            // --help/--version não são erros
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(args) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
