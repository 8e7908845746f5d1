use clap::builder::Styles;
use clap::builder::styling::{Ansi256Color, Color as ClapColor, RgbColor, Style};
use colored::Color;
use once_cell::sync::Lazy;

/// CLI color theme configuration
pub struct ColorTheme {
    pub success: Color,
    pub error: Color,
    pub warning: Color,
    pub info: Color,
    pub highlight: Color,
    pub muted: Color,
    pub primary: Color,
    pub secondary: Color,
    pub key: Color,
    pub value: Color,
}

impl Default for ColorTheme {
    fn default() -> Self {
        Self {
            success: Color::Green,
            error: Color::Red,
            warning: Color::Yellow,
            info: Color::Blue,
            highlight: Color::Cyan,
            muted: Color::BrightBlack,
            primary: Color::BrightBlue,
            secondary: Color::Magenta,
            key: Color::BrightCyan,
            value: Color::White,
        }
    }
}

impl ColorTheme {
    /// Clap help styles drawn from the same palette as the output manager.
    pub fn help_styles(&self) -> Styles {
        Styles::styled()
            .usage(clap_style(self.primary).bold())
            .header(clap_style(self.highlight).bold())
            .literal(clap_style(self.secondary))
            .placeholder(clap_style(self.muted))
            .valid(clap_style(self.success))
            .invalid(clap_style(self.warning))
            .error(clap_style(self.error).bold())
    }
}

fn clap_style(color: Color) -> Style {
    Style::new().fg_color(clap_color(color))
}

/// Maps a `colored` color onto clap's palette via its SGR foreground code.
fn clap_color(color: Color) -> Option<ClapColor> {
    if let Color::TrueColor { r, g, b } = color {
        return Some(ClapColor::Rgb(RgbColor(r, g, b)));
    }
    let code: u8 = color.to_fg_str().parse().ok()?;
    let index = match code {
        30..=37 => code - 30,
        90..=97 => code - 82,
        _ => return None,
    };
    Ansi256Color(index).into_ansi().map(ClapColor::Ansi)
}

/// Global theme instance
pub static THEME: Lazy<ColorTheme> = Lazy::new(ColorTheme::default);

/// Icons for different message types
pub struct Icons {
    pub success: &'static str,
    pub error: &'static str,
    pub warning: &'static str,
    pub info: &'static str,
    pub arrow: &'static str,
    pub bullet: &'static str,
    pub loading: &'static str,
    pub merge: &'static str,
    pub unresolved: &'static str,
}

pub const ICONS: Icons = Icons {
    success: "✓",
    error: "✗",
    warning: "⚠",
    info: "ℹ",
    arrow: "→",
    bullet: "•",
    loading: "⟳",
    merge: "⇢",
    unresolved: "?",
};
