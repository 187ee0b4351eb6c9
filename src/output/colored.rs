//! Terminal colors for probe output
//!
//! Latencies are colored by performance level; everything else uses a
//! fixed scheme. A disabled painter returns text untouched.

use colored::{Color, Colorize};

/// Performance level classification for color coding
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PerformanceLevel {
    Excellent, // < 50ms
    Good,      // 50-100ms
    Fair,      // 100-300ms
    Poor,      // 300-1000ms
    VeryPoor,  // > 1000ms
}

impl PerformanceLevel {
    pub fn from_latency_ms(time_ms: f64) -> Self {
        if time_ms < 50.0 {
            Self::Excellent
        } else if time_ms < 100.0 {
            Self::Good
        } else if time_ms < 300.0 {
            Self::Fair
        } else if time_ms < 1000.0 {
            Self::Poor
        } else {
            Self::VeryPoor
        }
    }

    pub fn color(&self) -> Color {
        match self {
            Self::Excellent => Color::Green,
            Self::Good => Color::Cyan,
            Self::Fair => Color::Yellow,
            Self::Poor => Color::Magenta,
            Self::VeryPoor => Color::Red,
        }
    }
}

/// Color scheme configuration
#[derive(Debug, Clone)]
pub struct ColorScheme {
    pub header: Color,
    pub success: Color,
    pub error: Color,
    pub info: Color,
    pub muted: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            header: Color::Blue,
            success: Color::Green,
            error: Color::Red,
            info: Color::Cyan,
            muted: Color::BrightBlack,
        }
    }
}

/// Applies a color scheme when enabled
#[derive(Debug, Clone)]
pub struct Painter {
    enabled: bool,
    scheme: ColorScheme,
}

impl Painter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled, scheme: ColorScheme::default() }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn paint(&self, text: &str, color: Color) -> String {
        if self.enabled {
            text.color(color).to_string()
        } else {
            text.to_string()
        }
    }

    pub fn header(&self, text: &str) -> String {
        if self.enabled {
            text.color(self.scheme.header).bold().to_string()
        } else {
            text.to_string()
        }
    }

    pub fn success(&self, text: &str) -> String {
        self.paint(text, self.scheme.success)
    }

    pub fn error(&self, text: &str) -> String {
        self.paint(text, self.scheme.error)
    }

    pub fn info(&self, text: &str) -> String {
        self.paint(text, self.scheme.info)
    }

    pub fn muted(&self, text: &str) -> String {
        self.paint(text, self.scheme.muted)
    }

    /// Latency text colored by its performance level
    pub fn latency(&self, text: &str, time_ms: f64) -> String {
        self.paint(text, PerformanceLevel::from_latency_ms(time_ms).color())
    }

    /// Status code colored by class
    pub fn status(&self, code: u16) -> String {
        let text = code.to_string();
        match code {
            200..=399 => self.success(&text),
            400..=499 => self.paint(&text, Color::Yellow),
            _ => self.error(&text),
        }
    }
}
