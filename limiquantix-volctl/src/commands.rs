//! Volume operations behind each subcommand.
//!
//! Everything here is blocking; the binary runs it on the blocking pool.

use anyhow::{Context, Result};
use serde_json::json;
use std::fs::File;
use std::io::{self, Read};
use tracing::{info, warn};

use limiquantix_storagevol::{
    CreateFlag, CreateFlags, DeleteFlag, DeleteFlags, DownloadFlags, InfoFlag, InfoFlags,
    MockStorage, ResizeFlag, ResizeFlags, StorageAbi, StoragePool, StorageVol, Stream,
    UploadFlags, VolumeInfo, VolumeXmlBuilder, XmlFlag, XmlFlags,
};

use crate::cli::Command;
use crate::config::{Config, DevConfig, StorageBackend};

/// Result of one subcommand, in both output forms.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub text: String,
    pub json: serde_json::Value,
}

impl Output {
    fn value(key: &str, value: String) -> Self {
        let mut map = serde_json::Map::new();
        map.insert(key.to_string(), serde_json::Value::String(value.clone()));
        Self {
            json: serde_json::Value::Object(map),
            text: value,
        }
    }

    fn info(info: &VolumeInfo) -> Self {
        Self {
            text: format!(
                "Type:       {}\nCapacity:   {}\nAllocation: {}",
                info.kind, info.capacity, info.allocation
            ),
            json: json!(info),
        }
    }

    /// Render for the terminal.
    pub fn render(&self, as_json: bool) -> String {
        if as_json {
            self.json.to_string()
        } else {
            self.text.clone()
        }
    }
}

/// Open the configured backend and run `command` against it.
pub fn execute(config: &Config, command: &Command) -> Result<Output> {
    match config.storage.backend {
        StorageBackend::Mock => {
            let session = dev_session(&config.storage.pool, &config.storage.dev)?;
            run(&session, &config.storage.pool, command)
        }
        StorageBackend::Libvirt => execute_libvirt(config, command),
    }
}

#[cfg(feature = "libvirt")]
fn execute_libvirt(config: &Config, command: &Command) -> Result<Output> {
    let session = limiquantix_storagevol::LibvirtStorage::open(&config.storage.uri)
        .with_context(|| format!("Failed to connect to libvirt at {}", config.storage.uri))?;
    run(&session, &config.storage.pool, command)
}

#[cfg(not(feature = "libvirt"))]
fn execute_libvirt(_config: &Config, _command: &Command) -> Result<Output> {
    anyhow::bail!("libvirt support is not compiled in; rebuild with --features libvirt or use --dev")
}

/// In-memory session holding the development pool and its seed volumes.
pub fn dev_session(pool: &str, dev: &DevConfig) -> Result<MockStorage> {
    let session = MockStorage::new();
    session.add_pool(pool, &dev.target, dev.capacity);

    {
        let handle = StoragePool::lookup_by_name(&session, pool)?;
        for vol in &dev.volumes {
            let xml = VolumeXmlBuilder::new(&vol.name, vol.capacity)
                .allocation(vol.allocation)
                .build();
            handle
                .create_volume_xml(&xml, CreateFlags::empty())
                .with_context(|| format!("Failed to seed volume {}", vol.name))?;
        }
    }

    info!(pool = %pool, volumes = dev.volumes.len(), "Development storage ready");
    Ok(session)
}

/// Run one subcommand on an open session.
pub fn run<A: StorageAbi>(session: &A, pool_name: &str, command: &Command) -> Result<Output> {
    let pool = StoragePool::lookup_by_name(session, pool_name)
        .with_context(|| format!("Storage pool {} not available", pool_name))?;

    let open = |name: &str| open_volume(&pool, pool_name, name);

    match command {
        Command::Info { volume, physical } => {
            let vol = open(volume)?;
            let info = if *physical {
                vol.get_info_flags(InfoFlag::GetPhysical.into())?
            } else {
                vol.get_info_flags(InfoFlags::empty())?
            };
            Ok(Output::info(&info))
        }

        Command::Key { volume } => Ok(Output::value("key", open(volume)?.get_key()?)),

        Command::Name { volume } => Ok(Output::value("name", open(volume)?.get_name()?)),

        Command::Path { volume } => Ok(Output::value("path", open(volume)?.get_path()?)),

        Command::Xml { volume, inactive } => {
            let flags: XmlFlags = if *inactive {
                XmlFlag::Inactive.into()
            } else {
                XmlFlags::empty()
            };
            Ok(Output::value("xml", open(volume)?.get_xml_desc(flags)?))
        }

        Command::Create {
            name,
            capacity,
            allocation,
            format,
            kind,
            prealloc_metadata,
        } => {
            let mut builder = VolumeXmlBuilder::new(name, *capacity);
            if let Some(kind) = kind {
                builder = builder.kind(*kind);
            }
            if let Some(allocation) = allocation {
                builder = builder.allocation(*allocation);
            }
            if let Some(format) = format {
                builder = builder.format(format);
            }

            let mut flags = CreateFlags::empty();
            if *prealloc_metadata {
                flags |= CreateFlag::PreallocMetadata;
            }

            let vol = pool
                .create_volume_xml(&builder.build(), flags)
                .with_context(|| format!("Failed to create volume {}", name))?;
            let path = vol.get_path()?;
            Ok(Output {
                json: json!({ "name": name, "key": vol.get_key()?, "path": path }),
                text: format!("Volume {} created at {}", name, path),
            })
        }

        Command::Delete {
            volume,
            zeroed,
            with_snapshots,
        } => {
            let mut flags = DeleteFlags::empty();
            if *zeroed {
                flags |= DeleteFlag::Zeroed;
            }
            if *with_snapshots {
                flags |= DeleteFlag::WithSnapshots;
            }

            let mut vol = open(volume)?;
            vol.delete(flags)?;
            vol.free()?;
            Ok(Output {
                json: json!({ "deleted": volume }),
                text: format!("Volume {} deleted", volume),
            })
        }

        Command::Resize {
            volume,
            size,
            allocate,
            delta,
            shrink,
        } => {
            let mut flags = ResizeFlags::empty();
            if *allocate {
                flags |= ResizeFlag::Allocate;
            }
            if *delta {
                flags |= ResizeFlag::Delta;
            }
            if *shrink {
                flags |= ResizeFlag::Shrink;
            }

            let vol = open(volume)?;
            vol.resize(*size, flags)?;
            Ok(Output::info(&vol.get_info()?))
        }

        Command::Wipe { volume, algorithm } => {
            let vol = open(volume)?;
            match algorithm {
                Some(algorithm) => vol.wipe_pattern(*algorithm, 0)?,
                None => vol.wipe(0)?,
            }
            let algorithm = algorithm.map(|a| a.as_str()).unwrap_or("zero");
            Ok(Output {
                json: json!({ "wiped": volume, "algorithm": algorithm }),
                text: format!("Volume {} wiped ({})", volume, algorithm),
            })
        }

        Command::Upload {
            volume,
            file,
            offset,
            length,
        } => {
            let vol = open(volume)?;
            let mut source =
                File::open(file).with_context(|| format!("Failed to open {}", file))?;
            let length = match length {
                Some(length) => *length,
                None => source.metadata()?.len(),
            };

            let mut stream = Stream::new(session)?;
            vol.upload(&stream, *offset, length, UploadFlags::empty())?;
            let bytes = transfer(&mut stream, |st| io::copy(&mut (&mut source).take(length), st))?;

            Ok(Output {
                json: json!({ "volume": volume, "bytes": bytes }),
                text: format!("Uploaded {} bytes to {}", bytes, volume),
            })
        }

        Command::Download {
            volume,
            file,
            offset,
            length,
        } => {
            let vol = open(volume)?;
            let mut target =
                File::create(file).with_context(|| format!("Failed to create {}", file))?;

            let mut stream = Stream::new(session)?;
            vol.download(&stream, *offset, length.unwrap_or(0), DownloadFlags::empty())?;
            let bytes = transfer(&mut stream, |st| io::copy(st, &mut target))?;

            Ok(Output {
                json: json!({ "volume": volume, "bytes": bytes }),
                text: format!("Downloaded {} bytes from {}", bytes, volume),
            })
        }

        Command::Pool { volume } => {
            let owner = open(volume)?.lookup_pool()?;
            Ok(Output::value("pool", owner.get_name()?))
        }
    }
}

fn open_volume<'c, A: StorageAbi>(
    pool: &StoragePool<'c, A>,
    pool_name: &str,
    name: &str,
) -> Result<StorageVol<'c, A>> {
    pool.lookup_volume_by_name(name)
        .with_context(|| format!("Volume {} not found in pool {}", name, pool_name))
}

/// Drive a bound stream to completion, aborting it if the copy fails.
fn transfer<'c, A, F>(stream: &mut Stream<'c, A>, copy: F) -> Result<u64>
where
    A: StorageAbi,
    F: FnOnce(&mut Stream<'c, A>) -> io::Result<u64>,
{
    match copy(stream) {
        Ok(bytes) => {
            stream.finish().context("Failed to complete transfer")?;
            Ok(bytes)
        }
        Err(e) => {
            if let Err(abort) = stream.abort() {
                warn!(error = %abort, "Failed to abort stream");
            }
            Err(e).context("Transfer failed")
        }
    }
}
