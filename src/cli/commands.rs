use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use pcsc::ShareMode;

use crate::core::{
    apdu::SelectOccurrence,
    reader::PcscReader,
    transcript::Recorder,
    transport::Transport,
    utils::{format_ascii, format_hex, format_hex_spaced, parse_df_name, parse_hex, parse_tag_id},
};
use crate::emv::{
    aids,
    dol::{DolResolver, TerminalConfig},
    session::{CardDetails, EmvSession, SelectedApplication},
    status::StatusWord,
    tags,
};
use crate::error::EmvError;
use crate::tlv::{ApplicationEntry, TagRegistry, TlvNode};

type Session = EmvSession<Recorder<PcscReader>>;

#[derive(Parser)]
#[command(name = "emv-tester")]
#[command(about = "EMV smart card explorer: select applications, read records, decode TLV")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging (every APDU)
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Connection share mode
    #[arg(short, long, global = true, default_value = "shared")]
    pub mode: ShareModeArg,

    /// Write the APDU transcript as JSON to this file
    #[arg(long, global = true)]
    pub transcript: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List available PCSC readers
    List {
        /// Show detailed information about readers
        #[arg(short = 'l', long)]
        detailed: bool,
    },

    /// Send a raw APDU
    Transmit {
        /// Reader name or index (use 'list' to see available readers)
        reader: String,

        /// APDU command in hex format (e.g., "00A404000E325041592E5359532E4444463031")
        apdu: String,

        /// Response format: hex, spaced, ascii, tlv or all
        #[arg(short, long)]
        format: Option<ResponseFormat>,
    },

    /// Decode a BER-TLV blob offline
    Decode {
        /// TLV data in hex
        hex: String,

        /// Only use the universal tags
        #[arg(short, long)]
        universal: bool,
    },

    /// SELECT an application by DF name
    Select {
        /// Reader name or index
        reader: String,

        /// AID in hex, a DF name such as 2PAY.SYS.DDF01, or a known name (ppse, visa, ...)
        name: String,

        /// Select every matching application
        #[arg(short, long)]
        all: bool,
    },

    /// Select an application and dump every record of one file
    Records {
        /// Reader name or index
        reader: String,

        /// AID or DF name to select first
        aid: String,

        /// Short file identifier
        sfi: u8,
    },

    /// GET DATA for one tag of a selected application
    GetData {
        /// Reader name or index
        reader: String,

        /// AID or DF name to select first
        aid: String,

        /// Tag name (PIN_TRIES, ATC, ...) or hex id
        tag: String,
    },

    /// Run the read-only card flow: directory, select, processing options, records
    Card {
        /// Reader name or index
        reader: String,

        /// Application to use instead of the directory's first choice
        aid: Option<String>,

        #[command(flatten)]
        terminal: TerminalArgs,
    },
}

/// Terminal settings used to answer the card's PDOL
#[derive(Args, Clone, Debug, Default)]
pub struct TerminalArgs {
    /// Terminal configuration file (JSON)
    #[arg(long)]
    pub terminal_config: Option<PathBuf>,

    /// Terminal transaction qualifiers override (4 bytes hex)
    #[arg(long)]
    pub ttq: Option<String>,

    /// Transaction currency override (2 bytes hex, e.g. 0840)
    #[arg(long)]
    pub currency: Option<String>,
}

#[derive(Clone, Debug)]
pub enum ShareModeArg {
    Shared,
    Exclusive,
}

impl std::str::FromStr for ShareModeArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "shared" => Ok(ShareModeArg::Shared),
            "exclusive" => Ok(ShareModeArg::Exclusive),
            _ => Err(format!("Invalid share mode: {s}")),
        }
    }
}

impl From<ShareModeArg> for ShareMode {
    fn from(mode: ShareModeArg) -> Self {
        match mode {
            ShareModeArg::Shared => ShareMode::Shared,
            ShareModeArg::Exclusive => ShareMode::Exclusive,
        }
    }
}

#[derive(Clone, Debug)]
pub enum ResponseFormat {
    Hex,
    HexSpaced,
    Ascii,
    Tlv,
    All,
}

impl std::str::FromStr for ResponseFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hex" => Ok(ResponseFormat::Hex),
            "spaced" => Ok(ResponseFormat::HexSpaced),
            "ascii" => Ok(ResponseFormat::Ascii),
            "tlv" => Ok(ResponseFormat::Tlv),
            "all" => Ok(ResponseFormat::All),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

/// Connection settings shared by every card command
struct ConnectOptions {
    mode: ShareModeArg,
    transcript: Option<PathBuf>,
}

pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        log::LevelFilter::Debug
    } else if cli.verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    let connect = ConnectOptions {
        mode: cli.mode.clone(),
        transcript: cli.transcript.clone(),
    };

    match &cli.command {
        Commands::List { detailed } => cmd_list(*detailed),
        Commands::Transmit {
            reader,
            apdu,
            format,
        } => cmd_transmit(&connect, reader, apdu, format.clone()),
        Commands::Decode { hex, universal } => cmd_decode(hex, *universal),
        Commands::Select { reader, name, all } => cmd_select(&connect, reader, name, *all),
        Commands::Records { reader, aid, sfi } => cmd_records(&connect, reader, aid, *sfi),
        Commands::GetData { reader, aid, tag } => cmd_get_data(&connect, reader, aid, tag),
        Commands::Card {
            reader,
            aid,
            terminal,
        } => {
            let config = terminal_config(terminal)?;
            cmd_card(&connect, reader, aid.as_deref(), &config)
        }
    }
}

/// Terminal settings from `--terminal-config`, then per-field overrides
fn terminal_config(args: &TerminalArgs) -> Result<TerminalConfig> {
    let mut config = match &args.terminal_config {
        Some(path) => TerminalConfig::load(path)?,
        None => TerminalConfig::default(),
    };
    if let Some(ttq) = &args.ttq {
        config.ttq = parse_fixed(ttq, "TTQ")?;
    }
    if let Some(currency) = &args.currency {
        config.currency_code = parse_fixed(currency, "Currency code")?;
    }
    Ok(config)
}

fn parse_fixed<const N: usize>(hex_str: &str, what: &str) -> Result<[u8; N]> {
    let bytes = parse_hex(hex_str).with_context(|| format!("Invalid {what}"))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| anyhow!("{what} must be {N} bytes, got {}", bytes.len()))
}

fn cmd_list(detailed: bool) -> Result<()> {
    let reader = PcscReader::new().context("Failed to initialize PCSC")?;

    let readers = reader.list_readers().context("Failed to list readers")?;

    if readers.is_empty() {
        println!("No PCSC readers found.");
        return Ok(());
    }

    println!("Available PCSC readers:");
    for (i, reader_info) in readers.iter().enumerate() {
        if detailed {
            println!("  [{}] {}", i, reader_info.name);
            println!(
                "      Status: {}",
                if reader_info.card_present {
                    "Card present"
                } else {
                    "No card"
                }
            );
            if let Some(ref atr) = reader_info.atr {
                println!("      ATR: {}", format_hex_spaced(atr));
            }
        } else if let (true, Some(atr)) = (reader_info.card_present, &reader_info.atr) {
            println!("  [{}] {} [CARD - ATR: {}]", i, reader_info.name, format_hex_spaced(atr));
        } else if reader_info.card_present {
            println!("  [{}] {} [CARD]", i, reader_info.name);
        } else {
            println!("  [{}] {}", i, reader_info.name);
        }
    }

    Ok(())
}

fn cmd_transmit(
    connect: &ConnectOptions,
    reader_name: &str,
    apdu_hex: &str,
    format: Option<ResponseFormat>,
) -> Result<()> {
    let apdu = parse_hex(apdu_hex).context("Failed to parse APDU hex string")?;
    if apdu.len() < 4 {
        bail!("APDU must have at least 4 header bytes");
    }

    with_session(connect, reader_name, |session| {
        println!("APDU: {}", format_hex_spaced(&apdu));
        let response = session
            .transport_mut()
            .transmit(&apdu)
            .context("Failed to execute transmit command")?;

        print_response(&response.data, &format.unwrap_or(ResponseFormat::HexSpaced));
        let status = response.status();
        println!("Status: {} ({})", status, status.describe());
        if let Some(record) = session.transport().history().last() {
            println!("Duration: {}ms", record.duration_ms);
        }
        Ok(())
    })
}

fn cmd_decode(hex_str: &str, universal: bool) -> Result<()> {
    let data = parse_hex(hex_str).context("Failed to parse TLV hex string")?;
    let registry = if universal {
        TagRegistry::universal()
    } else {
        tags::registry()
    };

    let dump = TlvNode::new(data, registry)
        .dump()
        .context("Failed to decode TLV data")?;
    if dump.is_empty() {
        println!("(empty)");
    } else {
        print!("{dump}");
    }
    Ok(())
}

fn cmd_select(connect: &ConnectOptions, reader_name: &str, name: &str, all: bool) -> Result<()> {
    let pattern = resolve_df_name(name)?;

    with_session(connect, reader_name, |session| {
        let apps = if all {
            session.select_all_by_name(&pattern)?
        } else {
            vec![session.select_by_name(&pattern, SelectOccurrence::First)?]
        };

        if apps.is_empty() {
            println!("No application matches {name}");
        }
        for app in &apps {
            print_application(app);
        }
        Ok(())
    })
}

fn cmd_records(connect: &ConnectOptions, reader_name: &str, aid: &str, sfi: u8) -> Result<()> {
    let pattern = resolve_df_name(aid)?;

    with_session(connect, reader_name, |session| {
        let app = session.select_by_name(&pattern, SelectOccurrence::First)?;
        print_application(&app);

        let records = session.read_all_records(sfi)?;
        if records.is_empty() {
            println!("SFI {sfi} has no records");
        }
        for (i, record) in records.iter().enumerate() {
            println!("Record {}:", i + 1);
            print_dump(record, 1);
        }
        Ok(())
    })
}

fn cmd_get_data(connect: &ConnectOptions, reader_name: &str, aid: &str, tag: &str) -> Result<()> {
    let pattern = resolve_df_name(aid)?;
    let registry = tags::registry();
    let tag = resolve_tag(&registry, tag)?;

    with_session(connect, reader_name, |session| {
        session.select_by_name(&pattern, SelectOccurrence::First)?;
        let value = session.get_data_parsed(tag)?;
        println!("{}: {}", registry.label(tag), value);
        Ok(())
    })
}

fn cmd_card(
    connect: &ConnectOptions,
    reader_name: &str,
    aid: Option<&str>,
    config: &TerminalConfig,
) -> Result<()> {
    let chosen = aid.map(resolve_df_name).transpose()?;
    let resolver = DolResolver::new(config);

    with_session(connect, reader_name, |session| {
        let aid = match chosen {
            Some(aid) => aid,
            None => {
                let mut entries = discover_applications(session)?;
                entries.sort_by_key(|entry| entry.priority.map_or(u64::MAX, |p| p & 0x0F));
                println!("Applications:");
                for entry in &entries {
                    println!("  {entry}");
                }
                entries
                    .into_iter()
                    .next()
                    .map(|entry| entry.aid)
                    .ok_or_else(|| anyhow!("Card lists no applications"))?
            }
        };

        let app = session.select_by_name(&aid, SelectOccurrence::First)?;
        print_application(&app);

        let pdol = app.pdol.clone().unwrap_or_default();
        let options = session
            .get_processing_options(&pdol, &resolver)
            .context("GET PROCESSING OPTIONS failed")?;

        println!("AIP: {}", format_hex_spaced(&options.aip.bytes()));
        for capability in options.aip.capabilities() {
            println!("  {capability}");
        }
        println!("AFL:");
        for entry in &options.afl {
            println!("  {entry}");
        }

        for (i, record) in session.read_afl_records(&options.afl)?.iter().enumerate() {
            println!("Record {}:", i + 1);
            print_dump(record, 1);

            let details = CardDetails::from_record(record)?;
            if let Some(name) = &details.name {
                println!("Cardholder: {name}");
            }
            if let Some(track2) = &details.track2 {
                println!("Card number: {}", track2.card_number);
                println!("Expiry (YYMM): {}", track2.expiry);
                println!("Service code: {}", track2.service_code);
            }
        }
        Ok(())
    })
}

/// Directory entries from the PPSE, or the PSE for contact-only cards
fn discover_applications(session: &mut Session) -> Result<Vec<ApplicationEntry>, EmvError> {
    match session.select_by_name(aids::PPSE, SelectOccurrence::First) {
        Ok(ppse) => ppse.ppse_applications(),
        Err(e) if e.is_status(StatusWord::FILE_NOT_FOUND) => {
            log::info!("No PPSE on card, trying PSE");
            let pse = session.select_by_name(aids::PSE, SelectOccurrence::First)?;
            let sfi = pse
                .sfi
                .ok_or_else(|| EmvError::MissingData("SFI of the PSE directory".into()))?;
            session.read_directory(sfi)
        }
        Err(e) => Err(e),
    }
}

/// Connect, run `f` against an EMV session, and write the transcript if asked
fn with_session<F>(connect: &ConnectOptions, reader_name: &str, f: F) -> Result<()>
where
    F: FnOnce(&mut Session) -> Result<()>,
{
    let mut reader = PcscReader::new().context("Failed to initialize PCSC")?;

    let reader_name = resolve_reader_name(&reader, reader_name)?;
    reader
        .connect(&reader_name, connect.mode.clone().into())
        .with_context(|| format!("Failed to connect to reader: {reader_name}"))?;
    if let Some(atr) = reader.atr() {
        log::info!("ATR: {}", format_hex(&atr));
    }

    let mut session = EmvSession::new(Recorder::new(reader));
    let result = f(&mut session);

    if let Some(path) = &connect.transcript {
        session.transport().save(path)?;
        let stats = session.transport().statistics();
        println!(
            "Transcript: {} exchanges ({} ok, {} failed) written to {}",
            stats.total,
            stats.successful,
            stats.failed,
            path.display()
        );
    }

    result
}

fn resolve_reader_name(reader: &PcscReader, name_or_index: &str) -> Result<String> {
    if let Ok(index) = name_or_index.parse::<usize>() {
        let readers = reader.list_readers()?;
        return match readers.get(index) {
            Some(info) => Ok(info.name.clone()),
            None if readers.is_empty() => bail!("No PCSC readers found"),
            None => bail!(
                "Reader index {} out of range (0-{})",
                index,
                readers.len() - 1
            ),
        };
    }

    Ok(name_or_index.to_string())
}

/// Known application name, hex AID, or ASCII DF name
fn resolve_df_name(name: &str) -> Result<Vec<u8>> {
    match aids::by_name(name) {
        Some(aid) => Ok(aid.to_vec()),
        None => parse_df_name(name),
    }
}

/// Registered tag name, or a hex id
fn resolve_tag(registry: &TagRegistry, tag: &str) -> Result<u32> {
    match registry.id_for(&tag.to_uppercase()) {
        Some(id) => Ok(id),
        None => parse_tag_id(tag).with_context(|| format!("Unknown tag '{tag}'")),
    }
}

fn print_application(app: &SelectedApplication) {
    match aids::describe(&app.aid) {
        Some(known) => println!("DF name: {} ({known})", app.df_name),
        None => println!("DF name: {}", app.df_name),
    }
    if let Some(label) = &app.label {
        println!("  Label: {label}");
    }
    if let Some(sfi) = app.sfi {
        println!("  SFI: {sfi}");
    }
    if let Some(pdol) = &app.pdol {
        let requests = pdol
            .iter()
            .map(|entry| format!("{:X} ({})", entry.tag, entry.length))
            .collect::<Vec<_>>()
            .join(", ");
        println!("  PDOL: {requests}");
    }
}

fn print_dump(node: &TlvNode, depth: usize) {
    let indent = "  ".repeat(depth);
    match node.dump() {
        Ok(dump) => {
            for line in dump.lines() {
                println!("{indent}{line}");
            }
        }
        Err(e) => {
            log::warn!("Record does not decode: {e}");
            println!("{indent}{}", format_hex_spaced(node.data()));
        }
    }
}

fn print_response(data: &[u8], format: &ResponseFormat) {
    if data.is_empty() {
        println!("Response: (empty)");
        return;
    }

    match format {
        ResponseFormat::Hex => {
            println!("Response: {}", format_hex(data));
        }
        ResponseFormat::HexSpaced => {
            println!("Response: {}", format_hex_spaced(data));
        }
        ResponseFormat::Ascii => {
            println!("Response (ASCII): {}", format_ascii(data));
        }
        ResponseFormat::Tlv => {
            println!("Response (TLV):");
            print_dump(&TlvNode::new(data.to_vec(), tags::registry()), 1);
        }
        ResponseFormat::All => {
            println!("Response (Hex): {}", format_hex_spaced(data));
            println!("Response (ASCII): {}", format_ascii(data));
            println!("Response (TLV):");
            print_dump(&TlvNode::new(data.to_vec(), tags::registry()), 1);
        }
    }
}
