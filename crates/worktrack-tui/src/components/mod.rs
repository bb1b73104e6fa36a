pub mod board;
pub mod time_entries;

use ratatui::style::{Color, Modifier, Style};
use worktrack_store::Theme;

/// Colors for borders and the selected row, picked from the stored theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub accent: Color,
    pub on_accent: Color,
}

impl Palette {
    pub fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::System | Theme::Dark => Self {
                accent: Color::Cyan,
                on_accent: Color::Black,
            },
            // Cyan on a light background is unreadable.
            Theme::Light => Self {
                accent: Color::Blue,
                on_accent: Color::White,
            },
        }
    }

    pub fn border(&self) -> Style {
        Style::default().fg(self.accent)
    }

    pub fn highlight(&self) -> Style {
        Style::default()
            .fg(self.on_accent)
            .bg(self.accent)
            .add_modifier(Modifier::BOLD)
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::for_theme(Theme::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_theme_swaps_accent() {
        assert_eq!(Palette::for_theme(Theme::Dark), Palette::default());
        let light = Palette::for_theme(Theme::Light);
        assert_eq!(light.accent, Color::Blue);
        assert_eq!(light.highlight().bg, Some(Color::Blue));
    }
}
