//! Audio quality tiers and negotiation against reported file sizes.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{DeezerError, Result};
use crate::models::PrivateTrackInfo;

/// Audio quality tiers, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QualityTier {
    /// FLAC lossless.
    Flac,
    /// MP3 320 kbps.
    Mp3_320,
    /// MP3 256 kbps.
    Mp3_256,
    /// MP3 128 kbps.
    Mp3_128,
}

impl QualityTier {
    /// All tiers from best to worst.
    pub const ALL: [QualityTier; 4] = [
        QualityTier::Flac,
        QualityTier::Mp3_320,
        QualityTier::Mp3_256,
        QualityTier::Mp3_128,
    ];

    /// Tier for a user setting, 1 = lossless .. 4 = lowest.
    pub fn from_setting(setting: u8) -> Result<Self> {
        match setting {
            1..=4 => Ok(Self::ALL[setting as usize - 1]),
            _ => Err(DeezerError::InvalidConfig(format!(
                "quality must be between 1 and 4, got {}",
                setting
            ))),
        }
    }

    /// The user setting for this tier.
    pub fn setting(&self) -> u8 {
        match self {
            QualityTier::Flac => 1,
            QualityTier::Mp3_320 => 2,
            QualityTier::Mp3_256 => 3,
            QualityTier::Mp3_128 => 4,
        }
    }

    /// Codec marker used by the CDN URL cipher.
    pub fn code(&self) -> &'static str {
        match self {
            QualityTier::Flac => "9",
            QualityTier::Mp3_320 => "3",
            QualityTier::Mp3_256 => "5",
            QualityTier::Mp3_128 => "1",
        }
    }

    /// File extension, including the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            QualityTier::Flac => ".flac",
            _ => ".mp3",
        }
    }

    /// Whether this tier is the lossless container.
    pub fn is_lossless(&self) -> bool {
        matches!(self, QualityTier::Flac)
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            QualityTier::Flac => "FLAC",
            QualityTier::Mp3_320 => "MP3_320",
            QualityTier::Mp3_256 => "MP3_256",
            QualityTier::Mp3_128 => "MP3_128",
        }
    }

    /// This tier and every lower one.
    pub fn and_below(self) -> impl Iterator<Item = QualityTier> {
        Self::ALL.into_iter().filter(move |t| *t >= self)
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of a successful negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    /// Tier that will be downloaded.
    pub tier: QualityTier,
    /// Reported size of that tier in bytes.
    pub size: u64,
    /// Tier the caller asked for.
    pub requested: QualityTier,
}

impl Negotiated {
    /// Whether a lower tier was substituted for the requested one.
    pub fn is_downgrade(&self) -> bool {
        self.tier != self.requested
    }
}

/// Pick the best tier at or below `requested` with a nonzero file size.
///
/// Returns `None` when no tier qualifies; the track is then skipped.
pub fn negotiate(info: &PrivateTrackInfo, requested: QualityTier) -> Option<Negotiated> {
    let negotiated = requested
        .and_below()
        .map(|tier| (tier, info.sizes.get(tier)))
        .find(|(_, size)| *size != 0)
        .map(|(tier, size)| Negotiated {
            tier,
            size,
            requested,
        })?;

    if negotiated.is_downgrade() {
        info!(
            "Track {} is not available in {}, downloading in {}",
            info.sng_id, requested, negotiated.tier
        );
    }

    Some(negotiated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileSizes;

    fn info(sizes: FileSizes) -> PrivateTrackInfo {
        PrivateTrackInfo {
            sng_id: "1".to_string(),
            sizes,
            ..Default::default()
        }
    }

    #[test]
    fn test_settings_map_to_tiers() {
        assert_eq!(QualityTier::from_setting(1).unwrap(), QualityTier::Flac);
        assert_eq!(QualityTier::from_setting(4).unwrap(), QualityTier::Mp3_128);
        assert!(QualityTier::from_setting(0).is_err());
        assert!(QualityTier::from_setting(5).is_err());
        for tier in QualityTier::ALL {
            assert_eq!(QualityTier::from_setting(tier.setting()).unwrap(), tier);
        }
    }

    #[test]
    fn test_codes_and_extensions() {
        assert_eq!(QualityTier::Flac.code(), "9");
        assert_eq!(QualityTier::Mp3_320.code(), "3");
        assert_eq!(QualityTier::Mp3_256.code(), "5");
        assert_eq!(QualityTier::Mp3_128.code(), "1");
        assert_eq!(QualityTier::Flac.extension(), ".flac");
        assert_eq!(QualityTier::Mp3_256.extension(), ".mp3");
    }

    #[test]
    fn test_requested_tier_available() {
        let n = negotiate(
            &info(FileSizes {
                flac: 30_000_000,
                mp3_320: 9_000_000,
                ..Default::default()
            }),
            QualityTier::Flac,
        )
        .unwrap();
        assert_eq!(n.tier, QualityTier::Flac);
        assert_eq!(n.size, 30_000_000);
        assert!(!n.is_downgrade());
    }

    #[test]
    fn test_falls_back_to_lower_tier() {
        let n = negotiate(
            &info(FileSizes {
                mp3_128: 3_500_000,
                ..Default::default()
            }),
            QualityTier::Mp3_320,
        )
        .unwrap();
        assert_eq!(n.tier, QualityTier::Mp3_128);
        assert_eq!(n.requested, QualityTier::Mp3_320);
        assert!(n.is_downgrade());
    }

    #[test]
    fn test_never_upgrades() {
        let n = negotiate(
            &info(FileSizes {
                flac: 30_000_000,
                ..Default::default()
            }),
            QualityTier::Mp3_320,
        );
        assert!(n.is_none());
    }

    #[test]
    fn test_all_zero_is_unavailable() {
        assert!(negotiate(&info(FileSizes::default()), QualityTier::Flac).is_none());
    }
}
