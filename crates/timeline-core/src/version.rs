use std::cmp::Ordering;

use tracing::warn;

use crate::variant::Variant;

/// Server types whose version strings carry a loader suffix after `-`
/// (e.g. `1.20.1-47.1.0`).
const SUFFIXED_SERVER_TYPES: &[&str] = &["FORGE", "NEOFORGE"];

/// A numeric release version such as `1.20.1`.
///
/// Trailing zero segments are insignificant, so `1.20 == 1.20.0`.
#[derive(Debug, Clone)]
pub struct ReleaseVersion(Vec<u64>);

impl ReleaseVersion {
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim();
        let s = s.strip_prefix(['v', 'V']).unwrap_or(s);
        if s.is_empty() {
            return None;
        }
        s.split('.')
            .map(|part| {
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    None
                } else {
                    part.parse::<u64>().ok()
                }
            })
            .collect::<Option<Vec<u64>>>()
            .map(ReleaseVersion)
    }

    fn significant(&self) -> &[u64] {
        let len = self
            .0
            .iter()
            .rposition(|&n| n != 0)
            .map(|i| i + 1)
            .unwrap_or(0);
        &self.0[..len]
    }
}

impl PartialEq for ReleaseVersion {
    fn eq(&self, other: &Self) -> bool {
        self.significant() == other.significant()
    }
}

impl Eq for ReleaseVersion {}

impl PartialOrd for ReleaseVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReleaseVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.significant().cmp(other.significant())
    }
}

/// Parse a variant's server version, applying the server type's normalization.
pub fn parse_server_version(server_type: &str, server_version: &str) -> Option<ReleaseVersion> {
    let normalized = if SUFFIXED_SERVER_TYPES
        .iter()
        .any(|t| t.eq_ignore_ascii_case(server_type))
    {
        server_version.split('-').next().unwrap_or(server_version)
    } else {
        server_version
    };
    ReleaseVersion::parse(normalized)
}

/// Advisory finding from [`check_version_order`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderWarning {
    Downgrade {
        index: usize,
        previous: String,
        current: String,
    },
    Unparsable {
        index: usize,
        version: String,
    },
}

/// Warn about apparent downgrades between consecutive variants.
///
/// Unparsable versions are reported once and skipped; the next parsable
/// version is compared against the last parsable one. Never fails.
pub fn check_version_order(variants: &[Variant]) -> Vec<OrderWarning> {
    let mut warnings = Vec::new();
    let mut last: Option<(ReleaseVersion, &str)> = None;

    for variant in variants {
        let Some(current) = parse_server_version(&variant.server_type, &variant.server_version)
        else {
            warn!(
                "Cannot verify that variant {:02} is not a downgrade, due to unsupported version format: \"{}\"",
                variant.index, variant.server_version
            );
            warnings.push(OrderWarning::Unparsable {
                index: variant.index,
                version: variant.server_version.clone(),
            });
            continue;
        };

        if let Some((previous, previous_raw)) = &last {
            if current < *previous {
                warn!(
                    "Variant {:02} seems to have a lower server version than the previous variant ({} -> {}). \
                     Be careful, your world may not load correctly!",
                    variant.index, previous_raw, variant.server_version
                );
                warnings.push(OrderWarning::Downgrade {
                    index: variant.index,
                    previous: previous_raw.to_string(),
                    current: variant.server_version.clone(),
                });
            }
        }
        last = Some((current, &variant.server_version));
    }

    warnings
}
