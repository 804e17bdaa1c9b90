//! Device, media, geolocation, permission, and network-condition emulation.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::Page;
use crate::cdp::{CdpClient, CdpError};

/// A device preset: viewport, user agent, and mobile/touch flags applied
/// atomically.
#[derive(Debug, Clone, Serialize)]
pub struct DevicePreset {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
    pub mobile: bool,
    pub touch: bool,
    pub user_agent: &'static str,
}

const MOBILE_SAFARI_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
     AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
const ANDROID_CHROME_UA: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Mobile Safari/537.36";
const IPAD_UA: &str = "Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X) \
     AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
const DESKTOP_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Built-in device presets, selectable by name.
pub const DEVICE_PRESETS: &[DevicePreset] = &[
    DevicePreset {
        name: "iphone-se",
        width: 375,
        height: 667,
        device_scale_factor: 2.0,
        mobile: true,
        touch: true,
        user_agent: MOBILE_SAFARI_UA,
    },
    DevicePreset {
        name: "iphone-14",
        width: 390,
        height: 844,
        device_scale_factor: 3.0,
        mobile: true,
        touch: true,
        user_agent: MOBILE_SAFARI_UA,
    },
    DevicePreset {
        name: "pixel-7",
        width: 412,
        height: 915,
        device_scale_factor: 2.6,
        mobile: true,
        touch: true,
        user_agent: ANDROID_CHROME_UA,
    },
    DevicePreset {
        name: "ipad",
        width: 820,
        height: 1180,
        device_scale_factor: 2.0,
        mobile: true,
        touch: true,
        user_agent: IPAD_UA,
    },
    DevicePreset {
        name: "laptop",
        width: 1366,
        height: 768,
        device_scale_factor: 1.0,
        mobile: false,
        touch: false,
        user_agent: DESKTOP_UA,
    },
    DevicePreset {
        name: "desktop-1080p",
        width: 1920,
        height: 1080,
        device_scale_factor: 1.0,
        mobile: false,
        touch: false,
        user_agent: DESKTOP_UA,
    },
];

/// Look up a device preset by name.
///
/// # Errors
///
/// Returns `CdpError::NotFound` listing the known names.
pub fn device_preset(name: &str) -> Result<&'static DevicePreset, CdpError> {
    DEVICE_PRESETS
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| {
            let known: Vec<&str> = DEVICE_PRESETS.iter().map(|p| p.name).collect();
            CdpError::NotFound(format!(
                "device preset {name:?} (known: {})",
                known.join(", ")
            ))
        })
}

/// Network throttling presets: `{offline, latency ms, download Bps,
/// upload Bps}` tuples fed to `Network.emulateNetworkConditions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottlePreset {
    Offline,
    Slow3g,
    Fast3g,
    Slow4g,
    Fast4g,
    /// Remove throttling.
    None,
}

impl ThrottlePreset {
    /// The `(offline, latency_ms, download_bps, upload_bps)` tuple.
    #[must_use]
    pub fn conditions(self) -> (bool, u64, i64, i64) {
        match self {
            Self::Offline => (true, 0, 0, 0),
            Self::Slow3g => (false, 400, 62_500, 31_250),
            Self::Fast3g => (false, 150, 187_500, 93_750),
            Self::Slow4g => (false, 100, 562_500, 187_500),
            Self::Fast4g => (false, 40, 1_687_500, 562_500),
            Self::None => (false, 0, -1, -1),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Slow3g => "slow3g",
            Self::Fast3g => "fast3g",
            Self::Slow4g => "slow4g",
            Self::Fast4g => "fast4g",
            Self::None => "none",
        }
    }
}

impl fmt::Display for ThrottlePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThrottlePreset {
    type Err = CdpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "offline" => Ok(Self::Offline),
            "slow3g" => Ok(Self::Slow3g),
            "fast3g" => Ok(Self::Fast3g),
            "slow4g" => Ok(Self::Slow4g),
            "fast4g" => Ok(Self::Fast4g),
            "none" => Ok(Self::None),
            other => Err(CdpError::InvalidArgument(format!(
                "unknown throttle preset {other:?} \
                 (expected offline, slow3g, fast3g, slow4g, fast4g, or none)"
            ))),
        }
    }
}

impl Page {
    /// Apply a device preset: viewport metrics, user agent, and touch
    /// emulation in one operation.
    ///
    /// # Errors
    ///
    /// Returns any command failure; a partial application is not rolled
    /// back.
    pub async fn emulate_device(&mut self, preset: &DevicePreset) -> Result<(), CdpError> {
        self.set_viewport(
            preset.width,
            preset.height,
            preset.device_scale_factor,
            preset.mobile,
        )
        .await?;
        self.set_user_agent(preset.user_agent).await?;
        self.set_touch(preset.touch).await?;
        Ok(())
    }

    /// Override viewport metrics.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::InvalidArgument` for a zero dimension.
    pub async fn set_viewport(
        &mut self,
        width: u32,
        height: u32,
        device_scale_factor: f64,
        mobile: bool,
    ) -> Result<(), CdpError> {
        if width == 0 || height == 0 {
            return Err(CdpError::InvalidArgument(format!(
                "viewport dimensions must be positive, got {width}x{height}"
            )));
        }
        self.call(
            "Emulation.setDeviceMetricsOverride",
            Some(serde_json::json!({
                "width": width,
                "height": height,
                "deviceScaleFactor": device_scale_factor,
                "mobile": mobile,
            })),
        )
        .await?;
        Ok(())
    }

    /// Override the user agent string.
    ///
    /// # Errors
    ///
    /// Returns any command failure.
    pub async fn set_user_agent(&mut self, user_agent: &str) -> Result<(), CdpError> {
        self.call(
            "Emulation.setUserAgentOverride",
            Some(serde_json::json!({ "userAgent": user_agent })),
        )
        .await?;
        Ok(())
    }

    /// Enable or disable touch emulation.
    ///
    /// # Errors
    ///
    /// Returns any command failure.
    pub async fn set_touch(&mut self, enabled: bool) -> Result<(), CdpError> {
        self.call(
            "Emulation.setTouchEmulationEnabled",
            Some(serde_json::json!({ "enabled": enabled })),
        )
        .await?;
        Ok(())
    }

    /// Clear the device metrics override.
    ///
    /// # Errors
    ///
    /// Returns any command failure.
    pub async fn clear_device_emulation(&mut self) -> Result<(), CdpError> {
        self.call("Emulation.clearDeviceMetricsOverride", None).await?;
        Ok(())
    }

    /// Emulate a media type and/or media features (e.g.
    /// `prefers-color-scheme: dark`).
    ///
    /// # Errors
    ///
    /// Returns any command failure.
    pub async fn set_media(
        &mut self,
        media: Option<&str>,
        features: &[(String, String)],
    ) -> Result<(), CdpError> {
        let features: Vec<serde_json::Value> = features
            .iter()
            .map(|(name, value)| serde_json::json!({ "name": name, "value": value }))
            .collect();
        let mut params = serde_json::json!({ "features": features });
        if let Some(media) = media {
            params["media"] = serde_json::json!(media);
        }
        self.call("Emulation.setEmulatedMedia", Some(params)).await?;
        Ok(())
    }

    /// Override geolocation.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::InvalidArgument` for out-of-range coordinates.
    pub async fn set_geolocation(
        &mut self,
        latitude: f64,
        longitude: f64,
        accuracy: f64,
    ) -> Result<(), CdpError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(CdpError::InvalidArgument(format!(
                "latitude out of range: {latitude}"
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(CdpError::InvalidArgument(format!(
                "longitude out of range: {longitude}"
            )));
        }
        self.call(
            "Emulation.setGeolocationOverride",
            Some(serde_json::json!({
                "latitude": latitude,
                "longitude": longitude,
                "accuracy": accuracy,
            })),
        )
        .await?;
        Ok(())
    }

    /// Clear the geolocation override.
    ///
    /// # Errors
    ///
    /// Returns any command failure.
    pub async fn clear_geolocation(&mut self) -> Result<(), CdpError> {
        self.call("Emulation.setGeolocationOverride", Some(serde_json::json!({})))
            .await?;
        Ok(())
    }

    /// Apply a network throttling preset.
    ///
    /// # Errors
    ///
    /// Returns any command failure.
    pub async fn throttle(&mut self, preset: ThrottlePreset) -> Result<(), CdpError> {
        self.ensure_domain("Network").await?;
        let (offline, latency, download, upload) = preset.conditions();
        self.call(
            "Network.emulateNetworkConditions",
            Some(serde_json::json!({
                "offline": offline,
                "latency": latency,
                "downloadThroughput": download,
                "uploadThroughput": upload,
            })),
        )
        .await?;
        Ok(())
    }
}

impl CdpClient {
    /// Grant, deny, or reset a permission for an origin
    /// (browser-level `Browser.setPermission`).
    ///
    /// # Errors
    ///
    /// Returns `CdpError::InvalidArgument` for an unknown setting, or any
    /// command failure.
    pub async fn set_permission(
        &self,
        origin: &str,
        permission: &str,
        setting: &str,
    ) -> Result<(), CdpError> {
        if !matches!(setting, "granted" | "denied" | "prompt") {
            return Err(CdpError::InvalidArgument(format!(
                "permission setting must be granted, denied, or prompt; got {setting:?}"
            )));
        }
        self.raw_call(
            "Browser.setPermission",
            Some(serde_json::json!({
                "origin": origin,
                "permission": { "name": permission },
                "setting": setting,
            })),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_lookup_is_case_insensitive() {
        assert_eq!(device_preset("IPhone-SE").unwrap().width, 375);
    }

    #[test]
    fn unknown_preset_lists_known_names() {
        let err = device_preset("nokia-3310").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("nokia-3310"));
        assert!(msg.contains("pixel-7"));
    }

    #[test]
    fn mobile_presets_have_touch() {
        for preset in DEVICE_PRESETS {
            if preset.mobile {
                assert!(preset.touch, "{} is mobile but not touch", preset.name);
            }
        }
    }

    #[test]
    fn throttle_preset_tuples() {
        assert_eq!(ThrottlePreset::Offline.conditions(), (true, 0, 0, 0));
        assert_eq!(
            ThrottlePreset::Slow3g.conditions(),
            (false, 400, 62_500, 31_250)
        );
        assert_eq!(
            ThrottlePreset::Fast4g.conditions(),
            (false, 40, 1_687_500, 562_500)
        );
        assert_eq!(ThrottlePreset::None.conditions(), (false, 0, -1, -1));
    }

    #[test]
    fn throttle_preset_parsing() {
        assert_eq!(
            "slow3g".parse::<ThrottlePreset>().unwrap(),
            ThrottlePreset::Slow3g
        );
        assert_eq!(
            "OFFLINE".parse::<ThrottlePreset>().unwrap(),
            ThrottlePreset::Offline
        );
        assert!(matches!(
            "warp-speed".parse::<ThrottlePreset>(),
            Err(CdpError::InvalidArgument(_))
        ));
    }

    #[test]
    fn preset_names_round_trip() {
        for preset in [
            ThrottlePreset::Offline,
            ThrottlePreset::Slow3g,
            ThrottlePreset::Fast3g,
            ThrottlePreset::Slow4g,
            ThrottlePreset::Fast4g,
            ThrottlePreset::None,
        ] {
            assert_eq!(preset.as_str().parse::<ThrottlePreset>().unwrap(), preset);
        }
    }
}
