use image::{imageops, RgbImage};
use lumen_contracts::session::OperationRequest;
use serde_json::{Map, Value};

use super::{adjust_linear, detect_edges, grayscale, kernels, rotate, saturate, unsharp_mask};
use crate::error::StudioError;

/// Rows produce R, G, B; columns weigh R, G, B.
const SEPIA: [[f64; 3]; 3] = [
    [0.189, 0.769, 0.393],
    [0.168, 0.686, 0.349],
    [0.131, 0.534, 0.272],
];

/// Largest blur kernel a named operation accepts.
const MAX_KERNEL: i64 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipDirection {
    Horizontal,
    Vertical,
}

impl FlipDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlipDirection::Horizontal => "horizontal",
            FlipDirection::Vertical => "vertical",
        }
    }
}

/// The discrete filters that can be invoked by name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NamedOperation {
    Brightness { value: i64 },
    Contrast { alpha: f64, beta: f64 },
    Blur { kernel: usize },
    Sharpen { amount: f64 },
    EdgeDetection { threshold1: f64, threshold2: f64 },
    Grayscale,
    Rotate { angle: f64 },
    Flip { direction: FlipDirection },
    Sepia,
    Negative,
}

impl NamedOperation {
    /// Resolves a name plus parameter map. Missing parameters take their
    /// defaults; names outside the set are [`StudioError::UnknownOperation`].
    pub fn parse(name: &str, params: &Map<String, Value>) -> Result<Self, StudioError> {
        let op = match name.trim().to_ascii_lowercase().as_str() {
            "brightness" => NamedOperation::Brightness {
                value: int_param(params, "value", 0)?,
            },
            "contrast" => NamedOperation::Contrast {
                alpha: float_param(params, "alpha", 1.0)?,
                beta: float_param(params, "beta", 0.0)?,
            },
            "blur" => NamedOperation::Blur {
                kernel: kernel_param(params)?,
            },
            "sharpen" => NamedOperation::Sharpen {
                amount: float_param(params, "amount", 1.5)?,
            },
            "edge_detection" => NamedOperation::EdgeDetection {
                threshold1: float_param(params, "threshold1", 100.0)?,
                threshold2: float_param(params, "threshold2", 200.0)?,
            },
            "grayscale" => NamedOperation::Grayscale,
            "rotate" => NamedOperation::Rotate {
                angle: float_param(params, "angle", 0.0)?,
            },
            "flip" => NamedOperation::Flip {
                direction: direction_param(params)?,
            },
            "sepia" => NamedOperation::Sepia,
            "negative" => NamedOperation::Negative,
            other => return Err(StudioError::UnknownOperation(other.to_string())),
        };
        Ok(op)
    }

    pub fn name(&self) -> &'static str {
        match self {
            NamedOperation::Brightness { .. } => "brightness",
            NamedOperation::Contrast { .. } => "contrast",
            NamedOperation::Blur { .. } => "blur",
            NamedOperation::Sharpen { .. } => "sharpen",
            NamedOperation::EdgeDetection { .. } => "edge_detection",
            NamedOperation::Grayscale => "grayscale",
            NamedOperation::Rotate { .. } => "rotate",
            NamedOperation::Flip { .. } => "flip",
            NamedOperation::Sepia => "sepia",
            NamedOperation::Negative => "negative",
        }
    }

    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        match *self {
            NamedOperation::Brightness { value } => adjust_linear(image, 1.0, value as f64),
            NamedOperation::Contrast { alpha, beta } => adjust_linear(image, alpha, beta),
            NamedOperation::Blur { kernel } => kernels::gaussian_blur(image, kernel, 0.0),
            NamedOperation::Sharpen { amount } => unsharp_mask(image, amount, 5, 0.0),
            NamedOperation::EdgeDetection {
                threshold1,
                threshold2,
            } => detect_edges(image, threshold1, threshold2),
            NamedOperation::Grayscale => grayscale(image),
            NamedOperation::Rotate { angle } => rotate(image, angle),
            NamedOperation::Flip { direction } => match direction {
                FlipDirection::Horizontal => imageops::flip_horizontal(image),
                FlipDirection::Vertical => imageops::flip_vertical(image),
            },
            NamedOperation::Sepia => sepia(image),
            NamedOperation::Negative => {
                let mut out = image.clone();
                imageops::invert(&mut out);
                out
            }
        }
    }

    pub fn describe(&self, reason: &str) -> String {
        let label = match *self {
            NamedOperation::Brightness { value } => format!("Brightness adjustment ({value:+})"),
            NamedOperation::Contrast { alpha, .. } => format!("Contrast adjustment (alpha={alpha})"),
            NamedOperation::Blur { kernel } => format!("Gaussian blur (kernel={kernel})"),
            NamedOperation::Sharpen { amount } => format!("Sharpen (amount={amount})"),
            NamedOperation::EdgeDetection {
                threshold1,
                threshold2,
            } => format!("Edge detection ({threshold1}, {threshold2})"),
            NamedOperation::Grayscale => "Grayscale".to_string(),
            NamedOperation::Rotate { angle } => format!("Rotation ({angle}°)"),
            NamedOperation::Flip { direction } => format!("Flip {}", direction.as_str()),
            NamedOperation::Sepia => "Sepia effect".to_string(),
            NamedOperation::Negative => "Negative".to_string(),
        };
        format!("{label}: {reason}")
    }
}

/// Result of one named operation. Failures carry a message instead of an
/// image, so a batch can keep going past them.
#[derive(Debug)]
pub struct OperationOutcome {
    pub operation: String,
    pub description: String,
    pub result: Result<RgbImage, StudioError>,
}

impl OperationOutcome {
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn image(&self) -> Option<&RgbImage> {
        self.result.as_ref().ok()
    }

    /// Description on success, error text on failure.
    pub fn message(&self) -> String {
        match &self.result {
            Ok(_) => self.description.clone(),
            Err(err) => format!("Could not apply {}: {err}", self.operation),
        }
    }
}

pub fn apply_named(image: &RgbImage, request: &OperationRequest) -> OperationOutcome {
    match NamedOperation::parse(&request.operation, &request.params) {
        Ok(op) => OperationOutcome {
            operation: op.name().to_string(),
            description: op.describe(&request.reason),
            result: Ok(op.apply(image)),
        },
        Err(err) => OperationOutcome {
            operation: request.operation.clone(),
            description: String::new(),
            result: Err(err),
        },
    }
}

/// Forces a Gaussian kernel size to be odd and positive: 4 -> 5, 6 -> 7.
pub fn odd_kernel(requested: i64) -> usize {
    let size = requested.max(1) as usize;
    if size % 2 == 1 {
        size
    } else {
        size + 1
    }
}

fn sepia(image: &RgbImage) -> RgbImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let rgb = [
            f64::from(pixel[0]),
            f64::from(pixel[1]),
            f64::from(pixel[2]),
        ];
        for (channel, row) in SEPIA.iter().enumerate() {
            pixel[channel] = saturate(row[0] * rgb[0] + row[1] * rgb[1] + row[2] * rgb[2]);
        }
    }
    out
}

fn number_param(params: &Map<String, Value>, key: &str) -> Result<Option<f64>, StudioError> {
    let Some(value) = params.get(key) else {
        return Ok(None);
    };
    let parsed = match value {
        Value::Null => return Ok(None),
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(number) if number.is_finite() => Ok(Some(number)),
        _ => Err(StudioError::InvalidParameter {
            name: key.to_string(),
            reason: format!("expected a number, got {value}"),
        }),
    }
}

fn int_param(params: &Map<String, Value>, key: &str, default: i64) -> Result<i64, StudioError> {
    Ok(number_param(params, key)?
        .map(|value| value.round() as i64)
        .unwrap_or(default))
}

fn float_param(params: &Map<String, Value>, key: &str, default: f64) -> Result<f64, StudioError> {
    Ok(number_param(params, key)?.unwrap_or(default))
}

fn kernel_param(params: &Map<String, Value>) -> Result<usize, StudioError> {
    let requested = int_param(params, "kernel", 5)?;
    if requested > MAX_KERNEL {
        return Err(StudioError::InvalidParameter {
            name: "kernel".to_string(),
            reason: format!("at most {MAX_KERNEL}, got {requested}"),
        });
    }
    Ok(odd_kernel(requested))
}

fn direction_param(params: &Map<String, Value>) -> Result<FlipDirection, StudioError> {
    let raw = params
        .get("direction")
        .and_then(Value::as_str)
        .unwrap_or("horizontal");
    match raw.trim().to_ascii_lowercase().as_str() {
        "horizontal" | "h" => Ok(FlipDirection::Horizontal),
        "vertical" | "v" => Ok(FlipDirection::Vertical),
        other => Err(StudioError::InvalidParameter {
            name: "direction".to_string(),
            reason: format!("expected horizontal or vertical, got {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};
    use lumen_contracts::session::OperationRequest;
    use serde_json::{json, Map};

    use super::{apply_named, odd_kernel, FlipDirection, NamedOperation};
    use crate::error::StudioError;

    fn sample() -> RgbImage {
        RgbImage::from_fn(6, 4, |x, y| Rgb([(x * 40) as u8, (y * 60) as u8, 100]))
    }

    #[test]
    fn even_kernels_become_odd() {
        assert_eq!(odd_kernel(4), 5);
        assert_eq!(odd_kernel(6), 7);
        assert_eq!(odd_kernel(5), 5);
        assert_eq!(odd_kernel(0), 1);
        assert_eq!(odd_kernel(-3), 1);

        let op = NamedOperation::parse("blur", json!({"kernel": 4}).as_object().unwrap_or(&Map::new()))
            .ok();
        assert_eq!(op, Some(NamedOperation::Blur { kernel: 5 }));
    }

    #[test]
    fn unknown_operation_fails_without_panicking() {
        let outcome = apply_named(&sample(), &OperationRequest::new("posterize"));
        assert!(!outcome.success());
        assert!(matches!(outcome.result, Err(StudioError::UnknownOperation(ref name)) if name == "posterize"));
        assert!(outcome.message().contains("posterize"));
    }

    #[test]
    fn bad_parameter_is_a_failed_outcome() {
        let request = OperationRequest::new("rotate").with_param("angle", json!("sideways"));
        let outcome = apply_named(&sample(), &request);
        assert!(matches!(outcome.result, Err(StudioError::InvalidParameter { .. })));
    }

    #[test]
    fn description_interpolates_reason() {
        let request = OperationRequest::new("brightness")
            .with_param("value", json!(30))
            .with_reason("underexposed");
        let outcome = apply_named(&sample(), &request);
        assert!(outcome.success());
        assert_eq!(outcome.description, "Brightness adjustment (+30): underexposed");
        assert_eq!(outcome.message(), outcome.description);
    }

    #[test]
    fn negative_inverts_every_channel() {
        let image = RgbImage::from_pixel(2, 2, Rgb([0, 100, 255]));
        let outcome = apply_named(&image, &OperationRequest::new("negative"));
        assert_eq!(outcome.image().map(|img| *img.get_pixel(1, 1)), Some(Rgb([255, 155, 0])));
    }

    #[test]
    fn sepia_mixes_and_clamps() {
        let image = RgbImage::from_pixel(1, 1, Rgb([255, 255, 255]));
        let outcome = apply_named(&image, &OperationRequest::new("sepia"));
        // every row of the matrix sums above 1 except blue
        assert_eq!(outcome.image().map(|img| *img.get_pixel(0, 0)), Some(Rgb([255, 255, 239])));
    }

    #[test]
    fn sepia_weighs_blue_heavier_than_red() {
        let red = RgbImage::from_pixel(1, 1, Rgb([255, 0, 0]));
        let outcome = apply_named(&red, &OperationRequest::new("sepia"));
        assert_eq!(outcome.image().map(|img| *img.get_pixel(0, 0)), Some(Rgb([48, 43, 33])));

        let blue = RgbImage::from_pixel(1, 1, Rgb([0, 0, 100]));
        let outcome = apply_named(&blue, &OperationRequest::new("sepia"));
        assert_eq!(outcome.image().map(|img| *img.get_pixel(0, 0)), Some(Rgb([39, 35, 27])));
    }

    #[test]
    fn oversized_blur_kernel_is_rejected() {
        for kernel in [json!(1e12), json!(256), json!("99999999")] {
            let request = OperationRequest::new("blur").with_param("kernel", kernel);
            let outcome = apply_named(&RgbImage::new(4, 4), &request);
            assert!(!outcome.success());
            assert!(matches!(
                outcome.result,
                Err(StudioError::InvalidParameter { ref name, .. }) if name == "kernel"
            ));
        }
        let largest = OperationRequest::new("blur").with_param("kernel", json!(255));
        let outcome = apply_named(&RgbImage::new(4, 4), &largest);
        assert!(outcome.success());
        assert_eq!(outcome.description, "Gaussian blur (kernel=255): ");
    }

    #[test]
    fn flip_direction_is_parsed() {
        let request = OperationRequest::new("flip").with_param("direction", json!("vertical"));
        let parsed = NamedOperation::parse(&request.operation, &request.params).ok();
        assert_eq!(
            parsed,
            Some(NamedOperation::Flip {
                direction: FlipDirection::Vertical
            })
        );
        let outcome = apply_named(&sample(), &request);
        let flipped = outcome.image().cloned().unwrap_or_default();
        assert_eq!(flipped.get_pixel(0, 0), sample().get_pixel(0, 3));
    }

    #[test]
    fn contrast_uses_alpha_and_beta() {
        let image = RgbImage::from_pixel(1, 1, Rgb([100, 100, 100]));
        let request = OperationRequest::new("contrast")
            .with_param("alpha", json!(1.5))
            .with_param("beta", json!(-10));
        let outcome = apply_named(&image, &request);
        assert_eq!(outcome.image().map(|img| *img.get_pixel(0, 0)), Some(Rgb([140, 140, 140])));
    }

    #[test]
    fn every_known_name_resolves() {
        for name in [
            "brightness",
            "contrast",
            "blur",
            "sharpen",
            "edge_detection",
            "grayscale",
            "rotate",
            "flip",
            "sepia",
            "negative",
        ] {
            let outcome = apply_named(&sample(), &OperationRequest::new(name));
            assert!(outcome.success(), "{name} failed: {}", outcome.message());
            assert_eq!(outcome.operation, name);
            assert_eq!(outcome.image().map(|img| img.dimensions()), Some((6, 4)));
        }
    }
}
