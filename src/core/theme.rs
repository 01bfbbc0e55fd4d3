//! Theme preference and device-class glue around the runtime.
//!
//! Hosts own cookie I/O and viewport measurement; this module turns those
//! inputs into writes on the reserved `ftd#` variables of every instance.

use super::runtime::Runtime;
use super::types::Value;
use crate::surface::RenderSurface;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use tracing::{info, warn};

pub const DARK_MODE: &str = "ftd#dark-mode";
pub const SYSTEM_DARK_MODE: &str = "ftd#system-dark-mode";
pub const FOLLOW_SYSTEM_DARK_MODE: &str = "ftd#follow-system-dark-mode";
pub const DEVICE: &str = "ftd#device";
pub const MOBILE_BREAKPOINT: &str = "ftd#mobile-breakpoint";
pub const DESKTOP_BREAKPOINT: &str = "ftd#desktop-breakpoint";

/// Name of the cookie holding the theme preference.
pub const DARK_MODE_COOKIE: &str = "ftd-dark-mode";

/// One `name=value` pair of a `Cookie` header.
static COOKIE_PAIR: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?:^|;)\s*([^=;\s]+)\s*=\s*([^;]*)").ok());

const DEFAULT_MOBILE_BREAKPOINT: u32 = 768;
const DEFAULT_DESKTOP_BREAKPOINT: u32 = 1440;

/// User theme preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeMode {
    Light,
    Dark,
    /// Follow the system color scheme
    System,
}

impl ThemeMode {
    /// Parse a stored preference. Unknown values fall back to `System`.
    pub fn parse(value: &str) -> Self {
        match value {
            "light" => Self::Light,
            "dark" => Self::Dark,
            "system-light" | "system-dark" => Self::System,
            other => {
                warn!(value = %other, "unrecognized theme preference, following system");
                Self::System
            }
        }
    }

    /// Preference stored in a `Cookie` header, defaulting to `System`.
    pub fn from_cookie_header(header: &str) -> Self {
        cookie_value(header, DARK_MODE_COOKIE)
            .map(Self::parse)
            .unwrap_or(Self::System)
    }

    /// Variable writes for this mode, in broadcast order.
    ///
    /// Explicit modes settle `dark-mode` first; system mode records that it
    /// follows the system before deriving `dark-mode` from it.
    pub fn writes(self, system_dark: bool) -> [(&'static str, bool); 3] {
        match self {
            Self::Light | Self::Dark => [
                (DARK_MODE, self == Self::Dark),
                (FOLLOW_SYSTEM_DARK_MODE, false),
                (SYSTEM_DARK_MODE, system_dark),
            ],
            Self::System => [
                (FOLLOW_SYSTEM_DARK_MODE, true),
                (SYSTEM_DARK_MODE, system_dark),
                (DARK_MODE, system_dark),
            ],
        }
    }

    /// Value to persist for this mode given the current system scheme.
    pub fn cookie_value(self, system_dark: bool) -> &'static str {
        match (self, system_dark) {
            (Self::Light, _) => "light",
            (Self::Dark, _) => "dark",
            (Self::System, true) => "system-dark",
            (Self::System, false) => "system-light",
        }
    }
}

/// Look up `name` in a `Cookie` header.
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    COOKIE_PAIR
        .as_ref()?
        .captures_iter(header)
        .find(|c| c.get(1).is_some_and(|k| k.as_str() == name))
        .and_then(|c| c.get(2))
        .map(|m| m.as_str().trim())
        .filter(|v| !v.is_empty())
}

/// Device class derived from the viewport width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Mobile,
    Desktop,
    Xxl,
}

impl Device {
    /// `width <= mobile` is mobile, `width > desktop` is xxl.
    pub fn classify(width: u32, mobile_breakpoint: u32, desktop_breakpoint: u32) -> Self {
        if width <= mobile_breakpoint {
            Self::Mobile
        } else if width > desktop_breakpoint {
            Self::Xxl
        } else {
            Self::Desktop
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mobile => write!(f, "mobile"),
            Self::Desktop => write!(f, "desktop"),
            Self::Xxl => write!(f, "xxl"),
        }
    }
}

impl<S: RenderSurface> Runtime<S> {
    /// Broadcast a theme preference. Returns the cookie value to persist.
    pub fn apply_theme(&mut self, mode: ThemeMode, system_dark: bool) -> &'static str {
        for (variable, flag) in mode.writes(system_dark) {
            self.set_for_all(variable, &Value::scalar(flag.to_string()));
        }
        let cookie = mode.cookie_value(system_dark);
        info!(mode = ?mode, system_dark, cookie, "theme applied");
        cookie
    }

    /// Breakpoints read from the `main` instance, or the first instance.
    pub fn breakpoints(&self) -> (u32, u32) {
        let read = |name: &str, default: u32| {
            let instance = self
                .instance("main")
                .map(|i| i.id.clone())
                .or_else(|| self.instance_ids().into_iter().next());
            instance
                .and_then(|id| self.get_value(&id, name).ok())
                .and_then(|v| v.as_text().trim().parse().ok())
                .unwrap_or(default)
        };
        (
            read(MOBILE_BREAKPOINT, DEFAULT_MOBILE_BREAKPOINT),
            read(DESKTOP_BREAKPOINT, DEFAULT_DESKTOP_BREAKPOINT),
        )
    }

    /// Classify `width` and broadcast the device when it changed from `last`.
    pub fn apply_device(&mut self, width: u32, last: Option<Device>) -> Device {
        let (mobile, desktop) = self.breakpoints();
        let device = Device::classify(width, mobile, desktop);
        if last != Some(device) {
            info!(width, device = %device, "device changed");
            self.set_for_all(DEVICE, &Value::scalar(device.to_string()));
        }
        device
    }
}
