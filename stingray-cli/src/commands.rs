//! CLI command implementations

use clap::{Args, Subcommand};
use stingray_core::FlowReport;
use stingray_scenarios::{dos_flood, eavesdrop, mitm_relay, Scenario, ScenarioConfig};

/// Knobs shared by every scenario subcommand.
#[derive(Args)]
pub struct CommonArgs {
    /// Number of base stations
    #[arg(long, default_value = "1")]
    num_enb: usize,
    /// Number of mobile terminals
    #[arg(long, default_value = "1")]
    num_ue: usize,
    /// Total duration of the simulation in seconds
    #[arg(long, default_value = "10.0")]
    sim_time: f64,
    /// Seed for placement and link-loss draws
    #[arg(long, default_value = "42")]
    seed: u64,
    /// Emit the report as JSON instead of text
    #[arg(long)]
    json: bool,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Flood the gateway's attack port from a set of adversary nodes
    Dos {
        #[command(flatten)]
        common: CommonArgs,
        /// Number of flooding adversaries
        #[arg(long, default_value = "5")]
        attackers: usize,
        /// Flood rate per adversary in bits per second
        #[arg(long, default_value = "1000000000")]
        attack_rate: u64,
        /// Flood packet size in bytes
        #[arg(long, default_value = "1400")]
        packet_size: usize,
    },
    /// Relay a terminal's stream through an adversary toward the gateway
    Mitm {
        #[command(flatten)]
        common: CommonArgs,
        /// Stream rate of the intercepted terminal in bits per second
        #[arg(long, default_value = "1000000")]
        stream_rate: u64,
        /// Stream packet size in bytes
        #[arg(long, default_value = "1400")]
        packet_size: usize,
    },
    /// Passively record a downlink stream at the terminal's endpoint
    Eavesdrop {
        #[command(flatten)]
        common: CommonArgs,
        /// Maximum packets the downlink client emits
        #[arg(long, default_value = "1000")]
        max_packets: u64,
        /// Inter-packet interval in milliseconds
        #[arg(long, default_value = "100")]
        interval_ms: u64,
        /// Downlink packet size in bytes
        #[arg(long, default_value = "1024")]
        client_packet_size: usize,
    },
}

/// Handle the CLI command
///
/// # Errors
///
/// Returns the setup error of the scenario builder if its configuration is
/// rejected; a run that aborts mid-flight still prints its partial report.
pub fn handle_command(command: Commands) -> anyhow::Result<()> {
    let (scenario, json) = match command {
        Commands::Dos {
            common,
            attackers,
            attack_rate,
            packet_size,
        } => {
            let json = common.json;
            let config = ScenarioConfig {
                num_attackers: attackers,
                attack_rate_bps: attack_rate,
                attack_packet_size: packet_size,
                ..base_config(common)
            };
            (dos_flood(&config)?, json)
        }
        Commands::Mitm {
            common,
            stream_rate,
            packet_size,
        } => {
            let json = common.json;
            let config = ScenarioConfig {
                stream_rate_bps: stream_rate,
                stream_packet_size: packet_size,
                ..base_config(common)
            };
            (mitm_relay(&config)?, json)
        }
        Commands::Eavesdrop {
            common,
            max_packets,
            interval_ms,
            client_packet_size,
        } => {
            let json = common.json;
            let config = ScenarioConfig {
                client_max_packets: max_packets,
                client_interval: std::time::Duration::from_millis(interval_ms),
                client_packet_size,
                ..base_config(common)
            };
            (eavesdrop(&config)?, json)
        }
    };

    run_and_print(scenario, json)
}

fn base_config(common: CommonArgs) -> ScenarioConfig {
    ScenarioConfig {
        num_enb: common.num_enb,
        num_ue: common.num_ue,
        sim_time_secs: common.sim_time,
        seed: common.seed,
        ..ScenarioConfig::default()
    }
}

fn run_and_print(mut scenario: Scenario, json: bool) -> anyhow::Result<()> {
    let report = scenario.run();
    print_report(&report, json)?;

    if let Some(sampler) = &scenario.sampler {
        let sampler = sampler.borrow();
        if let Some(peak) = sampler.samples().iter().map(|sample| sample.bits).max() {
            println!("Peak sink throughput: {peak} bps");
        }
    }
    Ok(())
}

fn print_report(report: &FlowReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{}", report.summary());
    }
    Ok(())
}
