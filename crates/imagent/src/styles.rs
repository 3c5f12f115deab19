// Style presets - prompt prefix/suffix pairs wrapped around the user's prompt

use crate::{ImageGenError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named style presets offered in the UI and CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Style {
    #[default]
    None,
    #[serde(rename = "Realistic Photography")]
    RealisticPhotography,
    Anime,
    #[serde(rename = "3D Render")]
    Render3d,
    #[serde(rename = "Oil Painting")]
    OilPainting,
    Watercolor,
    Cyberpunk,
    #[serde(rename = "Fantasy Art")]
    FantasyArt,
    #[serde(rename = "Pixel Art")]
    PixelArt,
    #[serde(rename = "Comic Book")]
    ComicBook,
}

/// Generation parameters a preset may supply when the request leaves them unset
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct StyleParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guidance_scale: Option<f64>,
}

impl StyleParams {
    pub const NONE: StyleParams = StyleParams {
        steps: None,
        guidance_scale: None,
    };
}

/// Prompt decoration for one style
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StylePreset {
    pub prefix: &'static str,
    pub suffix: &'static str,
    pub extra: StyleParams,
    pub description: &'static str,
}

const NONE: StylePreset = StylePreset {
    prefix: "",
    suffix: "",
    extra: StyleParams::NONE,
    description: "No style modifications",
};

const REALISTIC_PHOTOGRAPHY: StylePreset = StylePreset {
    prefix: "a high-resolution photograph of ",
    suffix: ", ultra realistic, 8k, detailed lighting, professional photography",
    extra: StyleParams::NONE,
    description: "Photorealistic style with high detail",
};

const ANIME: StylePreset = StylePreset {
    prefix: "anime style illustration of ",
    suffix: ", vibrant colors, clean line art, detailed, high quality anime",
    extra: StyleParams::NONE,
    description: "Japanese anime/manga style",
};

const RENDER_3D: StylePreset = StylePreset {
    prefix: "3D render of ",
    suffix: ", octane render, highly detailed, studio lighting, 8k, CGI",
    extra: StyleParams::NONE,
    description: "3D rendered, Pixar/CGI style",
};

const OIL_PAINTING: StylePreset = StylePreset {
    prefix: "oil painting of ",
    suffix: ", classical art style, brush strokes, artistic, masterpiece",
    extra: StyleParams::NONE,
    description: "Traditional oil painting style",
};

const WATERCOLOR: StylePreset = StylePreset {
    prefix: "watercolor painting of ",
    suffix: ", soft colors, artistic, flowing, delicate, traditional art",
    extra: StyleParams::NONE,
    description: "Watercolor painting style",
};

const CYBERPUNK: StylePreset = StylePreset {
    prefix: "cyberpunk style ",
    suffix: ", neon lights, futuristic, high tech, dystopian, vibrant colors",
    extra: StyleParams::NONE,
    description: "Futuristic cyberpunk aesthetic",
};

const FANTASY_ART: StylePreset = StylePreset {
    prefix: "fantasy art illustration of ",
    suffix: ", magical, ethereal, detailed, epic, artstation trending",
    extra: StyleParams::NONE,
    description: "Fantasy and magical themes",
};

const PIXEL_ART: StylePreset = StylePreset {
    prefix: "pixel art of ",
    suffix: ", 8-bit, retro gaming style, detailed pixels, nostalgic",
    extra: StyleParams::NONE,
    description: "Retro pixel art style",
};

const COMIC_BOOK: StylePreset = StylePreset {
    prefix: "comic book style illustration of ",
    suffix: ", bold lines, vibrant colors, superhero art, dynamic",
    extra: StyleParams::NONE,
    description: "Comic book illustration style",
};

impl Style {
    /// All styles in catalog order
    pub const ALL: [Style; 10] = [
        Style::None,
        Style::RealisticPhotography,
        Style::Anime,
        Style::Render3d,
        Style::OilPainting,
        Style::Watercolor,
        Style::Cyberpunk,
        Style::FantasyArt,
        Style::PixelArt,
        Style::ComicBook,
    ];

    /// Display name, as shown in the UI and stored in sidecars
    pub fn name(&self) -> &'static str {
        match self {
            Style::None => "None",
            Style::RealisticPhotography => "Realistic Photography",
            Style::Anime => "Anime",
            Style::Render3d => "3D Render",
            Style::OilPainting => "Oil Painting",
            Style::Watercolor => "Watercolor",
            Style::Cyberpunk => "Cyberpunk",
            Style::FantasyArt => "Fantasy Art",
            Style::PixelArt => "Pixel Art",
            Style::ComicBook => "Comic Book",
        }
    }

    /// Lowercase, underscore-separated form used in filenames
    pub fn slug(&self) -> String {
        self.name().to_lowercase().replace(' ', "_")
    }

    pub fn preset(&self) -> &'static StylePreset {
        match self {
            Style::None => &NONE,
            Style::RealisticPhotography => &REALISTIC_PHOTOGRAPHY,
            Style::Anime => &ANIME,
            Style::Render3d => &RENDER_3D,
            Style::OilPainting => &OIL_PAINTING,
            Style::Watercolor => &WATERCOLOR,
            Style::Cyberpunk => &CYBERPUNK,
            Style::FantasyArt => &FANTASY_ART,
            Style::PixelArt => &PIXEL_ART,
            Style::ComicBook => &COMIC_BOOK,
        }
    }

    /// Wrap a prompt in this style's prefix and suffix
    pub fn apply(&self, prompt: &str) -> String {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return String::new();
        }
        let preset = self.preset();
        format!("{}{}{}", preset.prefix, prompt, preset.suffix)
            .trim()
            .to_string()
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Style {
    type Err = ImageGenError;

    /// Accepts the display name (any case) or the slug
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Style::ALL
            .into_iter()
            .find(|style| style.name().to_lowercase() == wanted || style.slug() == wanted)
            .ok_or_else(|| ImageGenError::UnknownStyle(s.to_string()))
    }
}

/// Look up a style by name.
pub fn resolve(name: &str) -> Result<(Style, &'static StylePreset)> {
    let style = Style::from_str(name)?;
    Ok((style, style.preset()))
}

/// Like [`resolve`], but an unknown or missing name falls back to [`Style::None`].
pub fn resolve_or_default(name: Option<&str>) -> Style {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        None => Style::None,
        Some(name) => match Style::from_str(name) {
            Ok(style) => style,
            Err(err) => {
                tracing::warn!(style = name, "{}, falling back to None", err);
                Style::None
            }
        },
    }
}

/// Style names in catalog order
pub fn list_styles() -> Vec<&'static str> {
    Style::ALL.iter().map(Style::name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_is_pure() {
        let first = resolve("Anime").unwrap();
        let second = resolve("Anime").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.0, Style::Anime);
    }

    #[test]
    fn test_resolve_unknown_style() {
        let err = resolve("Vaporwave").unwrap_err();
        assert!(matches!(err, ImageGenError::UnknownStyle(ref s) if s == "Vaporwave"));
        assert_eq!(resolve_or_default(Some("Vaporwave")), Style::None);
        assert_eq!(resolve_or_default(None), Style::None);
    }

    #[test]
    fn test_resolve_accepts_slug_and_case() {
        assert_eq!(Style::from_str("3d_render").unwrap(), Style::Render3d);
        assert_eq!(Style::from_str("oil painting").unwrap(), Style::OilPainting);
        assert_eq!(Style::from_str(" PIXEL ART ").unwrap(), Style::PixelArt);
    }

    #[test]
    fn test_apply_wraps_prompt() {
        assert_eq!(Style::None.apply("  a cat "), "a cat");
        assert_eq!(
            Style::Anime.apply("a cat"),
            "anime style illustration of a cat, vibrant colors, clean line art, detailed, high quality anime"
        );
        assert_eq!(Style::Cyberpunk.apply("   "), "");
    }

    #[test]
    fn test_catalog_order_and_serde_names() {
        let names = list_styles();
        assert_eq!(names.len(), 10);
        assert_eq!(names[0], "None");
        assert_eq!(names[3], "3D Render");
        for style in Style::ALL {
            let json = serde_json::to_string(&style).unwrap();
            assert_eq!(json, format!("\"{}\"", style.name()));
        }
        assert_eq!(Style::Render3d.slug(), "3d_render");
    }
}
