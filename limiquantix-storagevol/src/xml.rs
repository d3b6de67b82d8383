//! libvirt storage volume XML.
//!
//! [`VolumeXmlBuilder`] renders the `<volume>` document accepted by
//! `virStorageVolCreateXML`; [`VolumeXml::parse`] reads one back, as
//! produced by `virStorageVolGetXMLDesc`.

use serde::Deserialize;

use crate::flags::VolumeType;

/// Builder for libvirt volume XML.
#[derive(Debug, Clone)]
pub struct VolumeXmlBuilder {
    name: String,
    kind: Option<VolumeType>,
    key: Option<String>,
    capacity: u64,
    allocation: Option<u64>,
    path: Option<String>,
    format: Option<String>,
}

impl VolumeXmlBuilder {
    /// Start a definition for a volume of `capacity` bytes.
    pub fn new(name: impl Into<String>, capacity: u64) -> Self {
        Self {
            name: name.into(),
            kind: None,
            key: None,
            capacity,
            allocation: None,
            path: None,
            format: None,
        }
    }

    pub fn kind(mut self, kind: VolumeType) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn allocation(mut self, allocation: u64) -> Self {
        self.allocation = Some(allocation);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Target format, e.g. `raw` or `qcow2`.
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Build the volume XML string.
    pub fn build(&self) -> String {
        let mut xml = match self.kind {
            Some(kind) => format!("<volume type='{}'>\n", kind),
            None => String::from("<volume>\n"),
        };

        xml.push_str(&format!("  <name>{}</name>\n", escape(&self.name)));
        if let Some(ref key) = self.key {
            xml.push_str(&format!("  <key>{}</key>\n", escape(key)));
        }
        xml.push_str(&format!("  <capacity unit='bytes'>{}</capacity>\n", self.capacity));
        if let Some(allocation) = self.allocation {
            xml.push_str(&format!("  <allocation unit='bytes'>{}</allocation>\n", allocation));
        }

        if self.path.is_some() || self.format.is_some() {
            xml.push_str("  <target>\n");
            if let Some(ref path) = self.path {
                xml.push_str(&format!("    <path>{}</path>\n", escape(path)));
            }
            if let Some(ref format) = self.format {
                xml.push_str(&format!("    <format type='{}'/>\n", escape(format)));
            }
            xml.push_str("  </target>\n");
        }

        xml.push_str("</volume>\n");
        xml
    }
}

fn escape(s: &str) -> String {
    quick_xml::escape::escape(s).into_owned()
}

// =============================================================================
// Parsing
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawVolume {
    #[serde(rename = "@type", default)]
    kind: Option<String>,
    name: String,
    #[serde(default)]
    key: Option<String>,
    capacity: RawSize,
    #[serde(default)]
    allocation: Option<RawSize>,
    #[serde(default)]
    target: Option<RawTarget>,
}

#[derive(Debug, Deserialize)]
struct RawSize {
    #[serde(rename = "@unit", default)]
    unit: Option<String>,
    #[serde(rename = "$text")]
    value: u64,
}

#[derive(Debug, Deserialize)]
struct RawTarget {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    format: Option<RawFormat>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    #[serde(rename = "@type")]
    kind: String,
}

/// Parsed volume definition, sizes normalized to bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeXml {
    pub name: String,
    pub kind: Option<VolumeType>,
    pub key: Option<String>,
    pub capacity: u64,
    pub allocation: Option<u64>,
    pub path: Option<String>,
    pub format: Option<String>,
}

impl VolumeXml {
    /// Parse a `<volume>` document.
    pub fn parse(xml: &str) -> Result<Self, String> {
        let raw: RawVolume =
            quick_xml::de::from_str(xml).map_err(|e| format!("malformed volume XML: {}", e))?;

        let kind = raw
            .kind
            .as_deref()
            .map(|k| k.parse::<VolumeType>())
            .transpose()?;

        let capacity = scale(raw.capacity.value, raw.capacity.unit.as_deref())?;
        let allocation = raw
            .allocation
            .map(|a| scale(a.value, a.unit.as_deref()))
            .transpose()?;

        let (path, format) = match raw.target {
            Some(target) => (target.path, target.format.map(|f| f.kind)),
            None => (None, None),
        };

        Ok(Self {
            name: raw.name,
            kind,
            key: raw.key,
            capacity,
            allocation,
            path,
            format,
        })
    }

    /// Builder reproducing this definition.
    pub fn to_builder(&self) -> VolumeXmlBuilder {
        VolumeXmlBuilder {
            name: self.name.clone(),
            kind: self.kind,
            key: self.key.clone(),
            capacity: self.capacity,
            allocation: self.allocation,
            path: self.path.clone(),
            format: self.format.clone(),
        }
    }
}

/// Apply a libvirt size unit to `value`.
///
/// Accepts the unit spellings libvirt does: `b`/`bytes`, decimal `KB`..`EB`
/// and binary `k`/`KiB`..`e`/`EiB`. No unit means bytes.
pub fn scale(value: u64, unit: Option<&str>) -> Result<u64, String> {
    let multiplier: u64 = match unit.unwrap_or("bytes") {
        "" | "b" | "byte" | "bytes" => 1,
        "KB" => 1_000,
        "k" | "K" | "KiB" => 1 << 10,
        "MB" => 1_000_000,
        "m" | "M" | "MiB" => 1 << 20,
        "GB" => 1_000_000_000,
        "g" | "G" | "GiB" => 1 << 30,
        "TB" => 1_000_000_000_000,
        "t" | "T" | "TiB" => 1 << 40,
        "PB" => 1_000_000_000_000_000,
        "p" | "P" | "PiB" => 1 << 50,
        "EB" => 1_000_000_000_000_000_000,
        "e" | "E" | "EiB" => 1 << 60,
        other => return Err(format!("unknown size unit '{}'", other)),
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size {} {} overflows", value, unit.unwrap_or("bytes")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_minimal() {
        let xml = VolumeXmlBuilder::new("disk0.img", 1024).build();
        assert_eq!(
            xml,
            "<volume>\n  <name>disk0.img</name>\n  <capacity unit='bytes'>1024</capacity>\n</volume>\n"
        );
    }

    #[test]
    fn test_build_full_and_parse() {
        let xml = VolumeXmlBuilder::new("vm-100-disk-0", 10 << 30)
            .kind(VolumeType::Block)
            .allocation(1 << 20)
            .path("/dev/vg0/vm-100-disk-0")
            .format("raw")
            .build();

        assert!(xml.starts_with("<volume type='block'>"));
        assert!(xml.contains("<format type='raw'/>"));

        let parsed = VolumeXml::parse(&xml).unwrap();
        assert_eq!(parsed.name, "vm-100-disk-0");
        assert_eq!(parsed.kind, Some(VolumeType::Block));
        assert_eq!(parsed.capacity, 10 << 30);
        assert_eq!(parsed.allocation, Some(1 << 20));
        assert_eq!(parsed.path.as_deref(), Some("/dev/vg0/vm-100-disk-0"));
        assert_eq!(parsed.format.as_deref(), Some("raw"));
    }

    #[test]
    fn test_parse_units() {
        let xml = r#"
<volume>
  <name>data.qcow2</name>
  <capacity unit="G">5</capacity>
  <allocation>0</allocation>
  <target>
    <format type="qcow2"/>
  </target>
</volume>"#;

        let parsed = VolumeXml::parse(xml).unwrap();
        assert_eq!(parsed.capacity, 5 << 30);
        assert_eq!(parsed.allocation, Some(0));
        assert_eq!(parsed.kind, None);
        assert_eq!(parsed.format.as_deref(), Some("qcow2"));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(VolumeXml::parse("<volume><name>x</name></volume>").is_err());
        assert!(VolumeXml::parse(
            "<volume type='floppy'><name>x</name><capacity>1</capacity></volume>"
        )
        .is_err());
        assert!(VolumeXml::parse(
            "<volume><name>x</name><capacity unit='furlongs'>1</capacity></volume>"
        )
        .is_err());
    }

    #[test]
    fn test_scale() {
        assert_eq!(scale(3, None).unwrap(), 3);
        assert_eq!(scale(2, Some("KB")).unwrap(), 2_000);
        assert_eq!(scale(2, Some("KiB")).unwrap(), 2_048);
        assert_eq!(scale(1, Some("T")).unwrap(), 1 << 40);
        assert!(scale(u64::MAX, Some("k")).is_err());
    }

    #[test]
    fn test_name_is_escaped() {
        let xml = VolumeXmlBuilder::new("a<b>&c", 1).build();
        assert!(xml.contains("<name>a&lt;b&gt;&amp;c</name>"));
        assert_eq!(VolumeXml::parse(&xml).unwrap().name, "a<b>&c");
    }
}
