use std::path::PathBuf;

use agrilog_core::models::{AlertSeverity, PlantStatus, RiskLevel};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "agrilog")]
#[command(about = "Offline-first field logging for smallholder farms")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the JSON configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Path to the local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print this installation's device id
    Device,
    /// Field activity log
    Log {
        #[command(subcommand)]
        command: LogCommands,
    },
    /// Harvest records
    Harvest {
        #[command(subcommand)]
        command: HarvestCommands,
    },
    /// Plants on the farm
    Plant {
        #[command(subcommand)]
        command: PlantCommands,
    },
    /// Farm alerts
    Alert {
        #[command(subcommand)]
        command: AlertCommands,
    },
    /// Plant health diagnoses
    Diagnosis {
        #[command(subcommand)]
        command: DiagnosisCommands,
    },
    /// Dashboard figures and sync state
    Stats {
        /// Month to total harvests for (YYYY-MM, defaults to this month)
        #[arg(long)]
        month: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run one sync cycle now
    Sync,
    /// Sync whenever connectivity returns, until interrupted
    Watch,
}

#[derive(Subcommand)]
pub enum LogCommands {
    /// Record an activity
    Add {
        #[arg(long)]
        block: String,
        #[arg(long)]
        activity: String,
        /// Date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Photo file to attach
        #[arg(long, value_name = "PATH")]
        photo: Option<PathBuf>,
    },
    /// List this device's entries
    List {
        /// Only entries on this date
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change fields of an entry
    Update {
        id: String,
        #[arg(long)]
        block: Option<String>,
        #[arg(long)]
        activity: Option<String>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long, value_name = "PATH")]
        photo: Option<PathBuf>,
    },
    /// Delete an entry
    Delete { id: String },
}

#[derive(Subcommand)]
pub enum HarvestCommands {
    /// Record a harvest
    Add {
        #[arg(long)]
        block: String,
        /// Quantity in kilograms
        #[arg(long)]
        quantity: f64,
        /// Quality grade (defaults to "Grade B")
        #[arg(long)]
        quality: Option<String>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List this device's harvests
    List {
        /// First date to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// Last date to include (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a harvest record
    Delete { id: String },
}

#[derive(Subcommand)]
pub enum PlantCommands {
    /// Register one plant
    Add {
        #[arg(long)]
        block: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "healthy")]
        status: PlantStatus,
        #[arg(long)]
        planted_date: Option<String>,
    },
    /// Register many healthy plants in a block
    Bulk {
        #[arg(long)]
        block: String,
        #[arg(long)]
        count: usize,
        /// Name prefix; plants are named "<prefix> <n>"
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long)]
        planted_date: Option<String>,
    },
    /// Change one plant's status
    Status { id: String, status: PlantStatus },
    /// Move plants in a block from one status to another
    BlockStatus {
        #[arg(long)]
        block: String,
        #[arg(long)]
        from: PlantStatus,
        #[arg(long)]
        to: PlantStatus,
        /// Maximum number of plants to change
        #[arg(long)]
        count: u32,
    },
    /// List plants across all devices
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a plant
    Delete { id: String },
}

#[derive(Subcommand)]
pub enum AlertCommands {
    /// Raise an alert
    Add {
        #[arg(long)]
        message: String,
        #[arg(long, default_value = "info")]
        severity: AlertSeverity,
        #[arg(long)]
        block: Option<String>,
    },
    /// List alerts across all devices
    List {
        /// Only unread alerts
        #[arg(long)]
        unread: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark an alert read
    Read { id: String },
    /// Delete an alert
    Delete { id: String },
}

#[derive(Subcommand)]
pub enum DiagnosisCommands {
    /// Record a diagnosis
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        #[arg(long, default_value = "none")]
        risk: RiskLevel,
        /// Observed symptom (repeatable)
        #[arg(long = "symptom")]
        symptoms: Vec<String>,
        /// Recommended action (repeatable)
        #[arg(long = "recommendation")]
        recommendations: Vec<String>,
        #[arg(long)]
        date: Option<String>,
    },
    /// List this device's diagnoses
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a diagnosis
    Delete { id: String },
}
