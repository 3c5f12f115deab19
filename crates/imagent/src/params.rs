// Parameter validation - clamps raw request values into configured bounds
// and resolves the seed

use crate::generation::GenerationMode;
use crate::styles::{self, Style};
use crate::{ImageGenError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Upper bound (inclusive) for randomly drawn seeds
pub const MAX_RANDOM_SEED: u64 = u32::MAX as u64;

/// Dimensions handed to the pipeline must be multiples of this
pub const DIMENSION_STEP: u32 = 8;

/// Inclusive bounds for every numeric generation parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationBounds {
    pub min_steps: u32,
    pub max_steps: u32,
    pub min_guidance_scale: f64,
    pub max_guidance_scale: f64,
    /// Applies to both width and height
    pub min_resolution: u32,
    pub max_resolution: u32,
    pub min_strength: f64,
    pub max_strength: f64,
}

impl Default for GenerationBounds {
    fn default() -> Self {
        Self {
            min_steps: 1,
            max_steps: 100,
            min_guidance_scale: 1.0,
            max_guidance_scale: 20.0,
            min_resolution: 256,
            max_resolution: 768,
            min_strength: 0.0,
            max_strength: 1.0,
        }
    }
}

/// Values used when a request leaves a field unset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationDefaults {
    pub steps: u32,
    pub guidance_scale: f64,
    pub width: u32,
    pub height: u32,
    pub strength: f64,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            steps: 30,
            guidance_scale: 7.5,
            width: 512,
            height: 512,
            strength: 0.75,
        }
    }
}

/// Defaults plus bounds, as loaded from configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationLimits {
    pub defaults: GenerationDefaults,
    pub bounds: GenerationBounds,
}

impl GenerationLimits {
    /// Check that the bounds are coherent and the defaults lie inside them
    pub fn validate(&self) -> Result<()> {
        let b = &self.bounds;
        let d = &self.defaults;

        if b.min_steps == 0 || b.min_steps > b.max_steps {
            return Err(ImageGenError::InvalidConfig(format!(
                "steps bounds must satisfy 1 <= min <= max (got {}..={})",
                b.min_steps, b.max_steps
            )));
        }
        if !(b.min_guidance_scale.is_finite() && b.max_guidance_scale.is_finite())
            || b.min_guidance_scale > b.max_guidance_scale
        {
            return Err(ImageGenError::InvalidConfig(format!(
                "guidance scale bounds are invalid ({}..={})",
                b.min_guidance_scale, b.max_guidance_scale
            )));
        }
        if b.min_resolution == 0
            || b.min_resolution % DIMENSION_STEP != 0
            || b.max_resolution % DIMENSION_STEP != 0
            || b.min_resolution > b.max_resolution
        {
            return Err(ImageGenError::InvalidConfig(format!(
                "resolution bounds must be positive multiples of {} with min <= max (got {}..={})",
                DIMENSION_STEP, b.min_resolution, b.max_resolution
            )));
        }
        if !(0.0..=1.0).contains(&b.min_strength)
            || !(0.0..=1.0).contains(&b.max_strength)
            || b.min_strength > b.max_strength
        {
            return Err(ImageGenError::InvalidConfig(format!(
                "strength bounds must lie within 0.0..=1.0 (got {}..={})",
                b.min_strength, b.max_strength
            )));
        }

        let inside = (b.min_steps..=b.max_steps).contains(&d.steps)
            && (b.min_guidance_scale..=b.max_guidance_scale).contains(&d.guidance_scale)
            && (b.min_resolution..=b.max_resolution).contains(&d.width)
            && (b.min_resolution..=b.max_resolution).contains(&d.height)
            && (b.min_strength..=b.max_strength).contains(&d.strength);
        if !inside {
            return Err(ImageGenError::InvalidConfig(
                "generation defaults must lie within the configured bounds".into(),
            ));
        }

        Ok(())
    }

    /// Clamp a width or height into bounds and round down to a multiple of 8
    pub fn clamp_dimension(&self, value: i64) -> u32 {
        let b = &self.bounds;
        let clamped = value.clamp(b.min_resolution as i64, b.max_resolution as i64) as u32;
        clamped - clamped % DIMENSION_STEP
    }

    pub fn clamp_steps(&self, value: i64) -> u32 {
        value.clamp(self.bounds.min_steps as i64, self.bounds.max_steps as i64) as u32
    }

    pub fn clamp_guidance_scale(&self, value: f64) -> f64 {
        value.clamp(self.bounds.min_guidance_scale, self.bounds.max_guidance_scale)
    }

    pub fn clamp_strength(&self, value: f64) -> f64 {
        value.clamp(self.bounds.min_strength, self.bounds.max_strength)
    }
}

/// A numeric form value as it arrives from the browser or CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberInput {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl NumberInput {
    /// Blank text counts as "not supplied"
    fn is_blank(&self) -> bool {
        matches!(self, NumberInput::Text(s) if s.trim().is_empty())
    }

    fn to_f64(&self, field: &str) -> Result<f64> {
        let value = match self {
            NumberInput::Integer(v) => *v as f64,
            NumberInput::Float(v) => *v,
            NumberInput::Text(s) => s.trim().parse::<f64>().map_err(|_| {
                ImageGenError::invalid_parameter(field, format!("`{}` is not a number", s.trim()))
            })?,
        };
        if !value.is_finite() {
            return Err(ImageGenError::invalid_parameter(field, "value must be finite"));
        }
        Ok(value)
    }

    /// Fractional values are truncated toward zero
    fn to_i64(&self, field: &str) -> Result<i64> {
        if let NumberInput::Integer(v) = self {
            return Ok(*v);
        }
        if let NumberInput::Text(s) = self {
            if let Ok(v) = s.trim().parse::<i64>() {
                return Ok(v);
            }
        }
        Ok(self.to_f64(field)?.trunc() as i64)
    }
}

impl From<i64> for NumberInput {
    fn from(value: i64) -> Self {
        NumberInput::Integer(value)
    }
}

impl From<f64> for NumberInput {
    fn from(value: f64) -> Self {
        NumberInput::Float(value)
    }
}

impl From<&str> for NumberInput {
    fn from(value: &str) -> Self {
        NumberInput::Text(value.to_string())
    }
}

/// Unvalidated generation request fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawParams {
    pub prompt: String,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub steps: Option<NumberInput>,
    #[serde(default)]
    pub guidance_scale: Option<NumberInput>,
    #[serde(default)]
    pub width: Option<NumberInput>,
    #[serde(default)]
    pub height: Option<NumberInput>,
    /// Negative or absent means "pick one"
    #[serde(default)]
    pub seed: Option<NumberInput>,
    /// Only read for image-to-image
    #[serde(default)]
    pub strength: Option<NumberInput>,
    /// Ignore `seed` and always draw a fresh one
    #[serde(default)]
    pub randomize_seed: bool,
}

impl RawParams {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }
}

/// Request parameters after clamping, seed resolution and styling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedParameters {
    /// The user's prompt, trimmed
    pub prompt: String,
    /// Style prefix + prompt + style suffix, as sent to the pipeline
    pub final_prompt: String,
    pub style: Style,
    pub steps: u32,
    pub guidance_scale: f64,
    pub width: u32,
    pub height: u32,
    pub seed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,
}

impl ResolvedParameters {
    /// Copy with different output dimensions (image-to-image follows the source size)
    pub fn with_dimensions(&self, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..self.clone()
        }
    }
}

/// Draw a fresh nonnegative seed
pub fn random_seed() -> u64 {
    rand::thread_rng().gen_range(0..=MAX_RANDOM_SEED)
}

fn present(value: &Option<NumberInput>) -> Option<&NumberInput> {
    value.as_ref().filter(|v| !v.is_blank())
}

fn resolve_seed(raw: &RawParams) -> Result<u64> {
    if raw.randomize_seed {
        return Ok(random_seed());
    }
    match present(&raw.seed) {
        None => Ok(random_seed()),
        Some(input) => {
            let seed = input.to_i64("seed")?;
            Ok(if seed < 0 { random_seed() } else { seed as u64 })
        }
    }
}

/// Validate and clamp raw parameters.
///
/// Out-of-range numbers are silently clamped; only values that cannot be
/// read as numbers (or an empty prompt) produce `InvalidParameter`.
pub fn normalize(
    raw: &RawParams,
    limits: &GenerationLimits,
    mode: GenerationMode,
) -> Result<ResolvedParameters> {
    let prompt = raw.prompt.trim();
    if prompt.is_empty() {
        return Err(ImageGenError::invalid_parameter("prompt", "prompt cannot be empty"));
    }

    let style = styles::resolve_or_default(raw.style.as_deref());
    let extra = style.preset().extra;
    let defaults = &limits.defaults;

    let steps = match present(&raw.steps) {
        Some(v) => v.to_i64("steps")?,
        None => extra.steps.unwrap_or(defaults.steps) as i64,
    };
    let guidance_scale = match present(&raw.guidance_scale) {
        Some(v) => v.to_f64("guidance_scale")?,
        None => extra.guidance_scale.unwrap_or(defaults.guidance_scale),
    };
    let width = match present(&raw.width) {
        Some(v) => v.to_i64("width")?,
        None => defaults.width as i64,
    };
    let height = match present(&raw.height) {
        Some(v) => v.to_i64("height")?,
        None => defaults.height as i64,
    };
    let strength = match mode {
        GenerationMode::Text2Img => None,
        GenerationMode::Img2Img => {
            let value = match present(&raw.strength) {
                Some(v) => v.to_f64("strength")?,
                None => defaults.strength,
            };
            Some(limits.clamp_strength(value))
        }
    };
    let seed = resolve_seed(raw)?;

    Ok(ResolvedParameters {
        prompt: prompt.to_string(),
        final_prompt: style.apply(prompt),
        style,
        steps: limits.clamp_steps(steps),
        guidance_scale: limits.clamp_guidance_scale(guidance_scale),
        width: limits.clamp_dimension(width),
        height: limits.clamp_dimension(height),
        seed,
        strength,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> GenerationLimits {
        GenerationLimits::default()
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let resolved = normalize(&RawParams::new("a cat"), &limits(), GenerationMode::Text2Img).unwrap();
        assert_eq!(resolved.steps, 30);
        assert_eq!(resolved.guidance_scale, 7.5);
        assert_eq!((resolved.width, resolved.height), (512, 512));
        assert_eq!(resolved.strength, None);
        assert_eq!(resolved.final_prompt, "a cat");
        assert!(resolved.seed <= MAX_RANDOM_SEED);
    }

    #[test]
    fn test_steps_above_max_are_clamped() {
        let raw = RawParams {
            steps: Some(500.into()),
            ..RawParams::new("a cat")
        };
        let resolved = normalize(&raw, &limits(), GenerationMode::Text2Img).unwrap();
        assert_eq!(resolved.steps, 100);
    }

    #[test]
    fn test_values_always_within_bounds() {
        let l = limits();
        let b = &l.bounds;
        for value in [-1_000_000i64, -1, 0, 1, 7, 255, 513, 767, 769, 10_000, i64::MAX, i64::MIN] {
            let raw = RawParams {
                steps: Some(value.into()),
                guidance_scale: Some((value as f64).into()),
                width: Some(value.into()),
                height: Some(value.into()),
                strength: Some((value as f64).into()),
                ..RawParams::new("x")
            };
            let r = normalize(&raw, &l, GenerationMode::Img2Img).unwrap();
            assert!((b.min_steps..=b.max_steps).contains(&r.steps));
            assert!((b.min_guidance_scale..=b.max_guidance_scale).contains(&r.guidance_scale));
            assert!((b.min_resolution..=b.max_resolution).contains(&r.width));
            assert!((b.min_resolution..=b.max_resolution).contains(&r.height));
            assert_eq!(r.width % DIMENSION_STEP, 0);
            let strength = r.strength.unwrap();
            assert!((b.min_strength..=b.max_strength).contains(&strength));
        }
    }

    #[test]
    fn test_dimensions_round_down_to_multiple_of_eight() {
        let raw = RawParams {
            width: Some(517.into()),
            height: Some("600.9".into()),
            ..RawParams::new("x")
        };
        let r = normalize(&raw, &limits(), GenerationMode::Text2Img).unwrap();
        assert_eq!((r.width, r.height), (512, 600));
    }

    #[test]
    fn test_text_values_are_coerced() {
        let raw = RawParams {
            steps: Some("42".into()),
            guidance_scale: Some(" 3.5 ".into()),
            seed: Some("".into()),
            ..RawParams::new("x")
        };
        let r = normalize(&raw, &limits(), GenerationMode::Text2Img).unwrap();
        assert_eq!(r.steps, 42);
        assert_eq!(r.guidance_scale, 3.5);
    }

    #[test]
    fn test_uncoercible_value_names_the_field() {
        let raw = RawParams {
            guidance_scale: Some("lots".into()),
            ..RawParams::new("x")
        };
        let err = normalize(&raw, &limits(), GenerationMode::Text2Img).unwrap_err();
        assert_eq!(err.field(), Some("guidance_scale"));

        let raw = RawParams {
            strength: Some(f64::NAN.into()),
            ..RawParams::new("x")
        };
        let err = normalize(&raw, &limits(), GenerationMode::Img2Img).unwrap_err();
        assert_eq!(err.field(), Some("strength"));
    }

    #[test]
    fn test_empty_prompt_is_rejected() {
        let err = normalize(&RawParams::new("   "), &limits(), GenerationMode::Text2Img).unwrap_err();
        assert_eq!(err.field(), Some("prompt"));
    }

    #[test]
    fn test_explicit_seed_is_kept() {
        let raw = RawParams {
            seed: Some(5.into()),
            ..RawParams::new("x")
        };
        let first = normalize(&raw, &limits(), GenerationMode::Text2Img).unwrap();
        let second = normalize(&raw, &limits(), GenerationMode::Text2Img).unwrap();
        assert_eq!(first.seed, 5);
        assert_eq!(first, second);
    }

    #[test]
    fn test_negative_seed_draws_random() {
        let raw = RawParams {
            seed: Some((-1).into()),
            ..RawParams::new("x")
        };
        let first = normalize(&raw, &limits(), GenerationMode::Text2Img).unwrap();
        let second = normalize(&raw, &limits(), GenerationMode::Text2Img).unwrap();
        assert_ne!(first.seed, second.seed);
    }

    #[test]
    fn test_randomize_seed_overrides_supplied_seed() {
        let raw = RawParams {
            seed: Some(5.into()),
            randomize_seed: true,
            ..RawParams::new("x")
        };
        let a = normalize(&raw, &limits(), GenerationMode::Text2Img).unwrap();
        let b = normalize(&raw, &limits(), GenerationMode::Text2Img).unwrap();
        assert!(a.seed != 5 || b.seed != 5);
    }

    #[test]
    fn test_style_is_applied_and_unknown_falls_back() {
        let raw = RawParams {
            style: Some("Pixel Art".into()),
            ..RawParams::new("a castle")
        };
        let r = normalize(&raw, &limits(), GenerationMode::Text2Img).unwrap();
        assert_eq!(r.style, Style::PixelArt);
        assert!(r.final_prompt.starts_with("pixel art of a castle"));

        let raw = RawParams {
            style: Some("Nope".into()),
            ..RawParams::new("a castle")
        };
        let r = normalize(&raw, &limits(), GenerationMode::Text2Img).unwrap();
        assert_eq!(r.style, Style::None);
        assert_eq!(r.final_prompt, "a castle");
    }

    #[test]
    fn test_raw_params_deserialize_mixed_types() {
        let raw: RawParams = serde_json::from_str(
            r#"{"prompt":"a cat","steps":30,"guidance_scale":7.5,"width":"512","seed":-1}"#,
        )
        .unwrap();
        assert_eq!(raw.steps, Some(NumberInput::Integer(30)));
        assert_eq!(raw.guidance_scale, Some(NumberInput::Float(7.5)));
        assert_eq!(raw.width, Some(NumberInput::Text("512".into())));
        assert_eq!(raw.seed, Some(NumberInput::Integer(-1)));
        assert!(!raw.randomize_seed);
    }

    #[test]
    fn test_limits_validation() {
        assert!(limits().validate().is_ok());

        let mut bad = limits();
        bad.bounds.min_resolution = 260;
        assert!(matches!(bad.validate(), Err(ImageGenError::InvalidConfig(_))));

        let mut bad = limits();
        bad.defaults.steps = 150;
        assert!(bad.validate().is_err());

        let mut bad = limits();
        bad.bounds.max_strength = 1.5;
        assert!(bad.validate().is_err());
    }
}
