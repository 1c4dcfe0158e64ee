//! # ASN Resolver
//!
//! Offline IPv4 → (ASN, organisation, country) lookup backed by a local
//! MaxMind-format database, with network-class classification and the
//! composite ASN risk used by the behavioural extractor.
//!
//! The database is optional: when the file is absent the resolver stays
//! disabled and every assessment carries zero risk, keeping the engine
//! fully operational.
//!
//! Per-lookup pipeline: validate IPv4 → database lookup → domestic-country
//! filter → class → density → drift → switching entropy → fused risk.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;

use maxminddb::Reader;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::store::GraphStore;
use crate::types::{AccountId, EngineResult};

/// Closed set of network classes with fixed base risks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AsnClass {
    Mobile,
    Broadband,
    Enterprise,
    InCloud,
    Hosting,
    UnknownDomestic,
    Foreign,
}

impl AsnClass {
    /// Fixed base risk per class.
    pub fn base_risk(self) -> f64 {
        match self {
            AsnClass::Mobile => 0.0,
            AsnClass::Broadband => 0.1,
            AsnClass::Enterprise => 0.3,
            AsnClass::InCloud => 0.6,
            AsnClass::Hosting => 0.7,
            AsnClass::UnknownDomestic => 0.5,
            AsnClass::Foreign => 0.8,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AsnClass::Mobile => "MOBILE",
            AsnClass::Broadband => "BROADBAND",
            AsnClass::Enterprise => "ENTERPRISE",
            AsnClass::InCloud => "IN_CLOUD",
            AsnClass::Hosting => "HOSTING",
            AsnClass::UnknownDomestic => "UNKNOWN_DOMESTIC",
            AsnClass::Foreign => "FOREIGN",
        }
    }
}

/// Raw resolution result (pipeline steps 1–4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsnInfo {
    pub asn: u32,
    pub org_name: String,
    pub country: String,
    pub class: AsnClass,
    pub base_risk: f64,
    pub foreign: bool,
    /// False when the address failed validation or missed the database.
    pub valid: bool,
}

impl AsnInfo {
    fn invalid() -> Self {
        Self {
            asn: 0,
            org_name: String::new(),
            country: String::new(),
            class: AsnClass::UnknownDomestic,
            base_risk: 0.0,
            foreign: false,
            valid: false,
        }
    }

    fn unknown_domestic() -> Self {
        Self {
            asn: 0,
            org_name: String::new(),
            country: String::new(),
            class: AsnClass::UnknownDomestic,
            base_risk: AsnClass::UnknownDomestic.base_risk(),
            foreign: false,
            valid: true,
        }
    }
}

/// Full risk assessment (pipeline steps 5–8).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AsnAssessment {
    pub info: Option<AsnInfo>,
    pub density_norm: f64,
    pub drift: bool,
    pub entropy: f64,
    pub entropy_norm: f64,
    /// Fused risk in [0, 1].
    pub risk: f64,
    /// Contribution to the behavioural budget, `risk × 20`.
    pub risk_scaled: f64,
}

#[derive(Deserialize)]
struct MmdbOrg {
    name: Option<String>,
    country: Option<String>,
}

#[derive(Deserialize)]
struct MmdbRecord {
    asn: Option<u32>,
    organization: Option<MmdbOrg>,
}

// Curated ASN sets for the domestic network. Global cloud providers are
// intentionally absent: their registration country routes them through the
// foreign path.
const MOBILE_ASNS: &[u32] = &[
    55836, 64049, 58678, 132524, // Reliance Jio
    45609, 24560, 9498, // Bharti Airtel
    55644, 38266, // Vodafone Idea
    45271, 9829, // BSNL
    45820, 17813, // MTNL
];
const BROADBAND_ASNS: &[u32] = &[
    17762, 55577, 24309, // ACT Fibernet
    17488, // Hathway
    18101, // Reliance Communications
    133982, 132335, 10029, 45528, 134091,
];
const ENTERPRISE_ASNS: &[u32] = &[4755, 6453, 17439, 9583, 10201, 18209, 55824];
const IN_CLOUD_ASNS: &[u32] = &[135929, 133275, 132116, 137687, 58695];
const HOSTING_ASNS: &[u32] = &[133296, 45769, 135580, 138835, 59163, 46015, 137194];

const ORG_KEYWORDS: &[(&str, AsnClass)] = &[
    ("jio", AsnClass::Mobile),
    ("airtel", AsnClass::Mobile),
    ("bharti", AsnClass::Mobile),
    ("vodafone", AsnClass::Mobile),
    ("bsnl", AsnClass::Mobile),
    ("mtnl", AsnClass::Mobile),
    ("fibernet", AsnClass::Broadband),
    ("hathway", AsnClass::Broadband),
    ("broadband", AsnClass::Broadband),
    ("tikona", AsnClass::Broadband),
    ("tata communications", AsnClass::Enterprise),
    ("sify", AsnClass::Enterprise),
    ("powergrid", AsnClass::Enterprise),
    ("yotta", AsnClass::InCloud),
    ("ctrls", AsnClass::InCloud),
    ("netmagic", AsnClass::InCloud),
    ("web werks", AsnClass::Hosting),
    ("cyfuture", AsnClass::Hosting),
    ("hosting", AsnClass::Hosting),
    ("datacenter", AsnClass::Hosting),
    ("data center", AsnClass::Hosting),
];

fn classify_domestic(asn: u32, org: &str) -> AsnClass {
    // Priority: mobile > broadband > enterprise > cloud > hosting.
    if MOBILE_ASNS.contains(&asn) {
        return AsnClass::Mobile;
    }
    if BROADBAND_ASNS.contains(&asn) {
        return AsnClass::Broadband;
    }
    if ENTERPRISE_ASNS.contains(&asn) {
        return AsnClass::Enterprise;
    }
    if IN_CLOUD_ASNS.contains(&asn) {
        return AsnClass::InCloud;
    }
    if HOSTING_ASNS.contains(&asn) {
        return AsnClass::Hosting;
    }
    let org_lc = org.to_ascii_lowercase();
    for (keyword, class) in ORG_KEYWORDS {
        if org_lc.contains(keyword) {
            return *class;
        }
    }
    AsnClass::UnknownDomestic
}

/// Public, routable IPv4 addresses only.
fn is_valid_public_ipv4(ip: &str) -> bool {
    let Ok(addr) = IpAddr::from_str(ip) else {
        return false;
    };
    let IpAddr::V4(v4) = addr else {
        return false;
    };
    !(v4.is_private()
        || v4.is_loopback()
        || v4.is_link_local()
        || v4.is_broadcast()
        || v4.is_documentation()
        || v4.is_multicast()
        || v4.is_unspecified()
        || v4.octets()[0] >= 240)
}

/// Offline ASN resolver. Construct once and share.
pub struct AsnResolver {
    reader: Option<Reader<Vec<u8>>>,
    domestic_country: String,
}

impl AsnResolver {
    /// Open the database at `path`; a missing or unreadable file yields a
    /// disabled resolver.
    pub fn open(path: impl AsRef<Path>, domestic_country: &str) -> Self {
        let path = path.as_ref();
        let reader = match Reader::open_readfile(path) {
            Ok(reader) => {
                info!(path = %path.display(), "ASN database loaded");
                Some(reader)
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "ASN database unavailable, ASN risk disabled");
                None
            }
        };
        Self {
            reader,
            domestic_country: domestic_country.to_ascii_uppercase(),
        }
    }

    /// Resolver with no database; every assessment is zero-risk.
    pub fn disabled(domestic_country: &str) -> Self {
        Self {
            reader: None,
            domestic_country: domestic_country.to_ascii_uppercase(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.reader.is_some()
    }

    /// Steps 1–4: validate, look up, country-filter, classify.
    pub fn resolve(&self, ip: &str) -> AsnInfo {
        if !is_valid_public_ipv4(ip) {
            return AsnInfo::invalid();
        }
        let Some(reader) = &self.reader else {
            return AsnInfo::invalid();
        };
        let addr: IpAddr = match ip.parse() {
            Ok(a) => a,
            Err(_) => return AsnInfo::invalid(),
        };
        let record: MmdbRecord = match reader.lookup(addr) {
            Ok(r) => r,
            Err(_) => return AsnInfo::unknown_domestic(),
        };

        let asn = record.asn.unwrap_or(0);
        let (org_name, country) = record
            .organization
            .map(|o| {
                (
                    o.name.unwrap_or_default(),
                    o.country.unwrap_or_default().to_ascii_uppercase(),
                )
            })
            .unwrap_or_default();

        let foreign = !country.is_empty() && country != self.domestic_country;
        let class = if foreign {
            AsnClass::Foreign
        } else {
            classify_domestic(asn, &org_name)
        };

        AsnInfo {
            asn,
            org_name,
            country,
            base_risk: class.base_risk(),
            class,
            foreign,
            valid: true,
        }
    }

    /// Steps 5–8: density, drift, entropy and the fused ASN risk for the
    /// sending account.
    pub async fn assess(
        &self,
        store: &dyn GraphStore,
        account: &AccountId,
        ip: &str,
    ) -> EngineResult<AsnAssessment> {
        let info = self.resolve(ip);
        if !info.valid {
            return Ok(AsnAssessment::default());
        }

        // Step 5: density = clamp(ln(1 + N) / ln(1001), 0, 1).
        let density_norm = if info.asn > 0 {
            let n = store.asn_density(info.asn).await? as f64;
            ((1.0 + n).ln() / 1001f64.ln()).clamp(0.0, 1.0)
        } else {
            0.0
        };

        // Steps 6 + 7: drift vs modal ASN, switching entropy.
        let histogram = store.asn_histogram(account).await?;
        let (drift, entropy) = drift_and_entropy(&histogram, info.asn);
        let entropy_norm = (entropy / 12f64.ln()).min(1.0);

        // Step 8: fuse.
        let risk = (0.4 * info.base_risk
            + 0.3 * density_norm
            + 0.2 * if drift { 1.0 } else { 0.0 }
            + 0.2 * if info.foreign { 1.0 } else { 0.0 }
            + 0.1 * entropy_norm)
            .clamp(0.0, 1.0);

        Ok(AsnAssessment {
            info: Some(info),
            density_norm,
            drift,
            entropy,
            entropy_norm,
            risk,
            risk_scaled: risk * 20.0,
        })
    }
}

fn drift_and_entropy(histogram: &HashMap<u32, u64>, current_asn: u32) -> (bool, f64) {
    if histogram.is_empty() {
        return (false, 0.0);
    }
    let modal_asn = histogram
        .iter()
        .max_by_key(|(_, &count)| count)
        .map(|(&asn, _)| asn);
    let drift = current_asn > 0 && modal_asn.map(|m| m != current_asn).unwrap_or(false);

    let total: u64 = histogram.values().sum();
    let mut entropy = 0.0;
    if total > 0 {
        for &count in histogram.values() {
            let p = count as f64 / total as f64;
            if p > 0.0 {
                entropy -= p * p.ln();
            }
        }
    }
    (drift, entropy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_private_loopback_and_v6() {
        assert!(!is_valid_public_ipv4("10.0.0.1"));
        assert!(!is_valid_public_ipv4("192.168.1.5"));
        assert!(!is_valid_public_ipv4("127.0.0.1"));
        assert!(!is_valid_public_ipv4("169.254.1.1"));
        assert!(!is_valid_public_ipv4("255.255.255.255"));
        assert!(!is_valid_public_ipv4("240.0.0.1"));
        assert!(!is_valid_public_ipv4("::1"));
        assert!(!is_valid_public_ipv4("not-an-ip"));
        assert!(is_valid_public_ipv4("49.37.10.20"));
    }

    #[test]
    fn classification_priority_and_keywords() {
        assert_eq!(classify_domestic(55836, "anything"), AsnClass::Mobile);
        assert_eq!(classify_domestic(17488, "Hathway"), AsnClass::Broadband);
        assert_eq!(classify_domestic(4755, ""), AsnClass::Enterprise);
        assert_eq!(classify_domestic(135929, ""), AsnClass::InCloud);
        assert_eq!(classify_domestic(133296, ""), AsnClass::Hosting);
        assert_eq!(
            classify_domestic(0, "Reliance Jio Infocomm"),
            AsnClass::Mobile
        );
        assert_eq!(
            classify_domestic(0, "Acme Data Center Pvt Ltd"),
            AsnClass::Hosting
        );
        assert_eq!(classify_domestic(0, "Some ISP"), AsnClass::UnknownDomestic);
    }

    #[test]
    fn base_risks_are_fixed() {
        assert_eq!(AsnClass::Mobile.base_risk(), 0.0);
        assert_eq!(AsnClass::Broadband.base_risk(), 0.1);
        assert_eq!(AsnClass::Enterprise.base_risk(), 0.3);
        assert_eq!(AsnClass::InCloud.base_risk(), 0.6);
        assert_eq!(AsnClass::Hosting.base_risk(), 0.7);
        assert_eq!(AsnClass::UnknownDomestic.base_risk(), 0.5);
        assert_eq!(AsnClass::Foreign.base_risk(), 0.8);
    }

    #[test]
    fn drift_fires_when_current_differs_from_mode() {
        let mut hist = HashMap::new();
        hist.insert(100, 8);
        hist.insert(200, 2);
        let (drift, entropy) = drift_and_entropy(&hist, 200);
        assert!(drift);
        assert!(entropy > 0.0);
        let (no_drift, _) = drift_and_entropy(&hist, 100);
        assert!(!no_drift);
    }

    #[test]
    fn entropy_of_uniform_histogram() {
        let mut hist = HashMap::new();
        for asn in 0..4u32 {
            hist.insert(asn + 1, 5);
        }
        let (_, entropy) = drift_and_entropy(&hist, 1);
        assert!((entropy - 4f64.ln()).abs() < 1e-9);
    }

    #[tokio::test]
    async fn disabled_resolver_scores_zero() {
        let resolver = AsnResolver::disabled("IN");
        let store = crate::store::MemoryGraphStore::new();
        let assessment = resolver
            .assess(&store, &"a".into(), "49.37.10.20")
            .await
            .unwrap();
        assert_eq!(assessment.risk, 0.0);
        assert_eq!(assessment.risk_scaled, 0.0);
        assert!(assessment.info.is_none());
    }
}
