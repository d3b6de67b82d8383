//! Command-line argument parsing.

use clap::{Parser, Subcommand};
use limiquantix_storagevol::{VolumeType, WipeAlgorithm};

/// limiquantix Volume Control - libvirt storage volume tool
#[derive(Parser, Debug)]
#[command(name = "limiquantix-volctl")]
#[command(about = "limiquantix Volume Control - libvirt storage volume tool")]
#[command(version)]
pub struct Args {
    /// Path to configuration file (optional, defaults used if not found)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Libvirt connection URI (e.g., qemu:///system)
    #[arg(long, env = "LIBVIRT_DEFAULT_URI")]
    pub uri: Option<String>,

    /// Storage pool holding the volumes
    #[arg(short, long)]
    pub pool: Option<String>,

    /// Enable development mode (in-memory storage backend)
    #[arg(long)]
    pub dev: bool,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show type, capacity and allocation
    Info {
        volume: String,
        /// Report allocation as the physical host size
        #[arg(long)]
        physical: bool,
    },

    /// Print the volume key
    Key { volume: String },

    /// Print the volume name
    Name { volume: String },

    /// Print the volume path on the host
    Path { volume: String },

    /// Dump the volume XML
    Xml {
        volume: String,
        /// Describe the inactive definition
        #[arg(long)]
        inactive: bool,
    },

    /// Create a volume in the pool
    Create {
        #[arg(long)]
        name: String,
        /// Capacity, e.g. 10G or 512MiB
        #[arg(long, value_parser = parse_size)]
        capacity: u64,
        /// Initial allocation (defaults to the full capacity)
        #[arg(long, value_parser = parse_size)]
        allocation: Option<u64>,
        /// Target format, e.g. raw or qcow2
        #[arg(long)]
        format: Option<String>,
        /// Volume type
        #[arg(long = "type")]
        kind: Option<VolumeType>,
        /// Preallocate metadata only
        #[arg(long)]
        prealloc_metadata: bool,
    },

    /// Delete a volume
    Delete {
        volume: String,
        /// Zero the data before removal
        #[arg(long)]
        zeroed: bool,
        /// Remove even if snapshots exist
        #[arg(long)]
        with_snapshots: bool,
    },

    /// Change the capacity of a volume
    Resize {
        volume: String,
        /// New capacity, or the change with --delta
        #[arg(value_parser = parse_size)]
        size: u64,
        /// Allocate the new capacity up front
        #[arg(long)]
        allocate: bool,
        /// Treat size as a change to the current capacity
        #[arg(long)]
        delta: bool,
        /// Allow the capacity to decrease
        #[arg(long)]
        shrink: bool,
    },

    /// Erase the volume contents
    Wipe {
        volume: String,
        /// Wipe algorithm (zero, nnsa, dod, bsi, gutmann, schneier,
        /// pfitzner7, pfitzner33, random, trim)
        #[arg(long)]
        algorithm: Option<WipeAlgorithm>,
    },

    /// Write a local file into the volume
    Upload {
        volume: String,
        file: String,
        #[arg(long, value_parser = parse_size, default_value = "0")]
        offset: u64,
        /// Bytes to write (defaults to the file size)
        #[arg(long, value_parser = parse_size)]
        length: Option<u64>,
    },

    /// Read the volume into a local file
    Download {
        volume: String,
        file: String,
        #[arg(long, value_parser = parse_size, default_value = "0")]
        offset: u64,
        /// Bytes to read (defaults to the end of the volume)
        #[arg(long, value_parser = parse_size)]
        length: Option<u64>,
    },

    /// Print the pool that contains the volume
    Pool { volume: String },
}

impl Command {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Info { .. } => "info",
            Self::Key { .. } => "key",
            Self::Name { .. } => "name",
            Self::Path { .. } => "path",
            Self::Xml { .. } => "xml",
            Self::Create { .. } => "create",
            Self::Delete { .. } => "delete",
            Self::Resize { .. } => "resize",
            Self::Wipe { .. } => "wipe",
            Self::Upload { .. } => "upload",
            Self::Download { .. } => "download",
            Self::Pool { .. } => "pool",
        }
    }
}

/// Parse a size such as `4096`, `10G` or `512MiB` into bytes.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);

    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid size '{}'", s))?;
    let unit = unit.trim();

    limiquantix_storagevol::xml::scale(value, (!unit.is_empty()).then_some(unit))
}
