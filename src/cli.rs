use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};
use tokio::sync::mpsc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use spoofguard::config::Config;
use spoofguard::guard::{
    Action, DataplaneCommand, FlowTimeout, GuardStats, OutputPort, PortNo, RecordingGateway,
    SwitchId,
};
use spoofguard::replay::replay_pcap;

#[derive(Parser)]
#[command(name = "spoofguard")]
#[command(author, version, about = "ARP and IP source spoofing guard for OpenFlow networks")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a pcap capture through the detectors
    Replay {
        /// Capture file (classic pcap, Ethernet link type)
        pcap: PathBuf,

        /// Datapath id the frames are attributed to
        #[arg(short, long, default_value = "1")]
        switch: u64,

        /// Ingress port the frames are attributed to
        #[arg(short, long, default_value = "1")]
        port: PortNo,

        /// Print issued commands as JSON lines
        #[arg(short, long)]
        json: bool,
    },

    /// Validate the configuration and show the binding tables
    CheckConfig,

    /// Generate default configuration file
    GenConfig {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the loaded configuration (file plus env overrides) instead of the commented default
        #[arg(short, long)]
        effective: bool,
    },
}

/// Table row for binding tables
#[derive(Tabled)]
struct BindingRow {
    #[tabled(rename = "Protected")]
    key: String,
    #[tabled(rename = "Bound To")]
    value: String,
}

/// Table row for issued dataplane commands
#[derive(Tabled)]
struct CommandRow {
    #[tabled(rename = "Switch")]
    switch: String,
    #[tabled(rename = "Command")]
    command: String,
    #[tabled(rename = "Match")]
    matches: String,
    #[tabled(rename = "Priority")]
    priority: String,
    #[tabled(rename = "Actions")]
    actions: String,
}

/// Subscriber active while the config loads, before the configured filter is known
pub fn bootstrap_subscriber<W>(make_writer: W) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::new("warn"))
        .with_writer(make_writer)
        .finish()
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Config::load_or_default().context("Failed to load config"),
    }
}

pub async fn run_command(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Replay {
            pcap,
            switch,
            port,
            json,
        } => cmd_replay(config, pcap, SwitchId(switch), port, json).await,
        Commands::CheckConfig => cmd_check_config(config),
        Commands::GenConfig { output, effective } => cmd_gen_config(&config, output, effective),
    }
}

async fn cmd_replay(
    config: Config,
    pcap: PathBuf,
    switch: SwitchId,
    port: PortNo,
    json: bool,
) -> Result<()> {
    let controller = spoofguard::build_controller(&config, RecordingGateway::new())?;

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let signal_handle = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(()).await;
        }
    });

    let (controller, stats) = replay_pcap(&pcap, switch, port, controller, shutdown_rx)
        .await
        .with_context(|| format!("Failed to replay {}", pcap.display()))?;
    signal_handle.abort();

    let commands = controller.gateway().commands();
    if json {
        for command in commands {
            println!("{}", serde_json::to_string(command)?);
        }
    } else if commands.is_empty() {
        println!("No dataplane commands issued");
    } else {
        let rows: Vec<CommandRow> = commands.iter().map(command_row).collect();
        println!("{}", Table::new(rows));
    }

    eprintln!(
        "{} {} frames ({} bytes)",
        "Replayed:".green().bold(),
        stats.frames,
        stats.bytes
    );
    if let Some(arp) = controller.arp_stats() {
        print_stats("ARP inspection", &arp);
    }
    if let Some(ipsg) = controller.source_guard_stats() {
        print_stats("IP source guard", &ipsg);
    }

    Ok(())
}

fn print_stats(name: &str, stats: &GuardStats) {
    let blocks = if stats.blocks > 0 {
        stats.blocks.to_string().red().bold()
    } else {
        stats.blocks.to_string().normal()
    };
    eprintln!(
        "{:<16} violations={} blocks={} offenders={} conforming={} unprotected={}",
        name,
        stats.violations,
        blocks,
        stats.tracked_identities,
        stats.conforming,
        stats.unprotected
    );
}

fn command_row(command: &DataplaneCommand) -> CommandRow {
    match command {
        DataplaneCommand::InstallFlow { switch, flow } => CommandRow {
            switch: switch.to_string(),
            command: if flow.is_drop() { "block" } else { "flow" }.to_string(),
            matches: flow
                .matches
                .in_port
                .map(|port| format!("in_port={}", port))
                .unwrap_or_else(|| "*".to_string()),
            priority: format!(
                "{}{}",
                flow.priority,
                if flow.hard_timeout == FlowTimeout::Permanent { " (permanent)" } else { "" }
            ),
            actions: format_actions(&flow.actions),
        },
        DataplaneCommand::PacketOut { switch, packet } => CommandRow {
            switch: switch.to_string(),
            command: "packet-out".to_string(),
            matches: format!("in_port={}", packet.in_port),
            priority: "-".to_string(),
            actions: format_actions(&packet.actions),
        },
    }
}

fn format_actions(actions: &[Action]) -> String {
    if actions.is_empty() {
        return "drop".to_string();
    }
    actions
        .iter()
        .map(|action| match action {
            Action::Output(OutputPort::Flood) => "output:flood".to_string(),
            Action::Output(OutputPort::Port(port)) => format!("output:{}", port),
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn cmd_check_config(config: Config) -> Result<()> {
    config.validate()?;

    let arp = &config.arp_inspection;
    println!(
        "{} {} (threshold {}, mode {:?}, priority {})",
        "ARP inspection:".bold(),
        if arp.enabled { "enabled".green() } else { "disabled".yellow() },
        arp.threshold,
        arp.mode,
        arp.block_priority
    );
    let rows: Vec<BindingRow> = arp
        .bindings
        .iter()
        .map(|(ip, mac)| BindingRow {
            key: ip.to_string(),
            value: mac.to_string(),
        })
        .collect();
    println!("{}", Table::new(rows));

    let ipsg = &config.ip_source_guard;
    println!(
        "{} {} (threshold {}, mode {:?}, priority {}, hubify {})",
        "IP source guard:".bold(),
        if ipsg.enabled { "enabled".green() } else { "disabled".yellow() },
        ipsg.threshold,
        ipsg.mode,
        ipsg.block_priority,
        ipsg.hubify_on_connect
    );
    let rows: Vec<BindingRow> = ipsg
        .bindings
        .iter()
        .map(|(mac, ip)| BindingRow {
            key: mac.to_string(),
            value: ip.to_string(),
        })
        .collect();
    println!("{}", Table::new(rows));

    println!("{}", "Configuration OK".green().bold());
    Ok(())
}

fn cmd_gen_config(config: &Config, output: Option<PathBuf>, effective: bool) -> Result<()> {
    match (output, effective) {
        (Some(path), true) => {
            config
                .save(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Configuration written to {}", path.display());
        }
        (Some(path), false) => {
            std::fs::write(&path, Config::default_with_comments())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Configuration written to {}", path.display());
        }
        (None, true) => print!("{}", config.to_string()?),
        (None, false) => println!("{}", Config::default_with_comments()),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_ignored_env_override_is_logged_during_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[arp_inspection]\nthreshold = 2").unwrap();

        let logs = CapturedLogs::default();
        let sink = logs.clone();
        std::env::set_var("SPOOFGUARD_ARP_THRESHOLD", "lots");
        let loaded = tracing::subscriber::with_default(
            bootstrap_subscriber(move || sink.clone()),
            || load_config(Some(file.path())),
        );
        std::env::remove_var("SPOOFGUARD_ARP_THRESHOLD");

        assert_eq!(loaded.unwrap().arp_inspection.threshold, 2);
        let output = String::from_utf8(logs.0.lock().clone()).unwrap();
        assert!(output.contains("SPOOFGUARD_ARP_THRESHOLD"), "{}", output);
    }

    #[test]
    fn test_format_actions() {
        assert_eq!(format_actions(&[]), "drop");
        assert_eq!(
            format_actions(&[Action::Output(OutputPort::Flood), Action::Output(OutputPort::Port(3))]),
            "output:flood,output:3"
        );
    }
}
