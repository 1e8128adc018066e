//! Haar cascade detector (Viola-Jones) for OpenCV cascade XML files.
//!
//! Supports the `opencv-cascade-classifier` layout with `BOOST` stages and
//! upright `HAAR` features, e.g. `haarcascade_frontalface_default.xml` and
//! `haarcascade_eye.xml`. Detection runs over an image pyramid with
//! integral images and per-window variance normalisation, then merges raw
//! hits with [`group_rectangles`].

use crate::detector::{crop_region, group_rectangles, DetectionParams, Detector};
use crate::types::Rect;
use image::imageops::{self, FilterType};
use image::GrayImage;
use roxmltree::Node;
use std::path::Path;
use thiserror::Error;

const LEGACY_TYPE_ID: &str = "opencv-haar-classifier";

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("failed to read cascade {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cascade XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("malformed cascade: {0}")]
    Malformed(String),
    #[error("unsupported cascade: {0}")]
    Unsupported(String),
    #[error("invalid detection parameters: {0}")]
    InvalidParams(String),
}

/// One node of a weak classifier tree.
///
/// `left`/`right` > 0 index another node; <= 0 index a leaf as `-value`.
#[derive(Debug, Clone, Copy)]
struct TreeNode {
    left: i32,
    right: i32,
    feature: usize,
    threshold: f64,
}

#[derive(Debug, Clone)]
struct WeakClassifier {
    nodes: Vec<TreeNode>,
    leaves: Vec<f64>,
}

#[derive(Debug, Clone)]
struct Stage {
    threshold: f64,
    classifiers: Vec<WeakClassifier>,
}

/// Weighted rectangles in window coordinates.
#[derive(Debug, Clone)]
struct HaarFeature {
    rects: Vec<(Rect, f64)>,
}

/// A parsed boosted Haar cascade.
#[derive(Debug, Clone)]
pub struct HaarCascade {
    window_width: u32,
    window_height: u32,
    stages: Vec<Stage>,
    features: Vec<HaarFeature>,
}

fn element_children<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|c| c.is_element())
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Result<Node<'a, 'input>, CascadeError> {
    element_children(node)
        .find(|c| c.has_tag_name(name))
        .ok_or_else(|| {
            CascadeError::Malformed(format!("<{}> has no <{name}>", node.tag_name().name()))
        })
}

/// Concatenated direct text of a node, ignoring comments.
fn node_text(node: Node) -> String {
    node.children()
        .filter(|c| c.is_text())
        .filter_map(|c| c.text())
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_value<T: std::str::FromStr>(token: &str, what: &str) -> Result<T, CascadeError> {
    token
        .parse()
        .map_err(|_| CascadeError::Malformed(format!("bad {what}: {token:?}")))
}

fn child_value<T: std::str::FromStr>(node: Node, name: &str) -> Result<T, CascadeError> {
    let text = node_text(child(node, name)?);
    parse_value(text.trim(), name)
}

fn parse_list<T: std::str::FromStr>(node: Node, what: &str) -> Result<Vec<T>, CascadeError> {
    node_text(node)
        .split_whitespace()
        .map(|t| parse_value(t, what))
        .collect()
}

impl HaarCascade {
    /// Load a cascade from an OpenCV XML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CascadeError> {
        let path = path.as_ref();
        let xml = std::fs::read_to_string(path).map_err(|source| CascadeError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let cascade = Self::from_xml(&xml)?;
        tracing::info!(
            path = %path.display(),
            window = ?(cascade.window_width, cascade.window_height),
            stages = cascade.stages.len(),
            features = cascade.features.len(),
            "loaded Haar cascade"
        );
        Ok(cascade)
    }

    /// Parse a cascade from OpenCV XML text.
    pub fn from_xml(xml: &str) -> Result<Self, CascadeError> {
        let doc = roxmltree::Document::parse(xml)?;

        if doc
            .descendants()
            .any(|n| n.attribute("type_id") == Some(LEGACY_TYPE_ID))
        {
            return Err(CascadeError::Unsupported(
                "legacy opencv-haar-classifier layout; convert it with a current OpenCV".into(),
            ));
        }

        let root = doc
            .descendants()
            .find(|n| n.has_tag_name("cascade"))
            .ok_or_else(|| CascadeError::Malformed("no <cascade> element".into()))?;

        let stage_type = node_text(child(root, "stageType")?);
        if stage_type.trim() != "BOOST" {
            return Err(CascadeError::Unsupported(format!("stage type {}", stage_type.trim())));
        }
        let feature_type = node_text(child(root, "featureType")?);
        if feature_type.trim() != "HAAR" {
            return Err(CascadeError::Unsupported(format!("feature type {}", feature_type.trim())));
        }

        let window_width: u32 = child_value(root, "width")?;
        let window_height: u32 = child_value(root, "height")?;
        if window_width < 3 || window_height < 3 {
            return Err(CascadeError::Malformed(format!(
                "window {window_width}x{window_height} is too small"
            )));
        }

        let features = element_children(child(root, "features")?)
            .map(|f| parse_feature(f, window_width, window_height))
            .collect::<Result<Vec<_>, _>>()?;

        let stages = element_children(child(root, "stages")?)
            .map(|s| parse_stage(s, features.len()))
            .collect::<Result<Vec<_>, _>>()?;

        if stages.is_empty() {
            return Err(CascadeError::Malformed("cascade has no stages".into()));
        }

        Ok(Self {
            window_width,
            window_height,
            stages,
            features,
        })
    }

    pub fn window_size(&self) -> (u32, u32) {
        (self.window_width, self.window_height)
    }

    /// Run the cascade over `gray` at every pyramid scale and group the hits.
    pub fn detect_multi_scale(&self, gray: &GrayImage, params: &DetectionParams) -> Vec<Rect> {
        let raw = self.detect_raw(gray, params);
        let grouped = group_rectangles(&raw, params.min_neighbors);
        tracing::debug!(raw = raw.len(), grouped = grouped.len(), "cascade detection");
        grouped
    }

    /// Ungrouped window hits in `gray` coordinates.
    fn detect_raw(&self, gray: &GrayImage, params: &DetectionParams) -> Vec<Rect> {
        let (img_w, img_h) = gray.dimensions();
        let (win_w, win_h) = (self.window_width, self.window_height);
        let mut hits = Vec::new();

        let mut factor = 1.0f64;
        loop {
            let scaled_w = (img_w as f64 / factor).round() as u32;
            let scaled_h = (img_h as f64 / factor).round() as u32;
            if scaled_w <= win_w || scaled_h <= win_h {
                break;
            }

            let out_w = (win_w as f64 * factor).round() as u32;
            let out_h = (win_h as f64 * factor).round() as u32;
            if params.max_size > 0 && (out_w > params.max_size || out_h > params.max_size) {
                break;
            }

            if out_w >= params.min_size && out_h >= params.min_size {
                let level = if scaled_w == img_w && scaled_h == img_h {
                    gray.clone()
                } else {
                    imageops::resize(gray, scaled_w, scaled_h, FilterType::Triangle)
                };
                let integral = Integral::new(&level);
                let step = if factor > 2.0 { 1 } else { 2 };

                for y in (0..scaled_h - win_h).step_by(step) {
                    for x in (0..scaled_w - win_w).step_by(step) {
                        if self.evaluate_window(&integral, x as usize, y as usize) {
                            hits.push(Rect::new(
                                (x as f64 * factor).round() as i32,
                                (y as f64 * factor).round() as i32,
                                out_w as i32,
                                out_h as i32,
                            ));
                        }
                    }
                }
            }

            factor *= params.scale_factor;
        }

        hits
    }

    /// True if the window at `(x, y)` passes every stage.
    fn evaluate_window(&self, integral: &Integral, x: usize, y: usize) -> bool {
        let w = self.window_width as usize;
        let h = self.window_height as usize;

        // Variance normalisation over the window shrunk by one pixel per side.
        let area = ((w - 2) * (h - 2)) as f64;
        let sum = integral.sum(x + 1, y + 1, w - 2, h - 2) as f64;
        let sq_sum = integral.sq_sum(x + 1, y + 1, w - 2, h - 2) as f64;
        let variance = area * sq_sum - sum * sum;
        let norm = if variance > 0.0 { variance.sqrt() } else { 1.0 };

        for stage in &self.stages {
            let mut stage_sum = 0.0f64;
            for weak in &stage.classifiers {
                let mut idx = 0usize;
                let leaf = loop {
                    let node = &weak.nodes[idx];
                    let value = self.features[node.feature].evaluate(integral, x, y);
                    let next = if value < node.threshold * norm {
                        node.left
                    } else {
                        node.right
                    };
                    if next <= 0 {
                        break weak.leaves[(-next) as usize];
                    }
                    idx = next as usize;
                };
                stage_sum += leaf;
            }
            if stage_sum < stage.threshold {
                return false;
            }
        }
        true
    }
}

impl HaarFeature {
    fn evaluate(&self, integral: &Integral, ox: usize, oy: usize) -> f64 {
        self.rects
            .iter()
            .map(|(r, weight)| {
                integral.sum(
                    ox + r.x as usize,
                    oy + r.y as usize,
                    r.width as usize,
                    r.height as usize,
                ) as f64
                    * weight
            })
            .sum()
    }
}

fn parse_feature(node: Node, window_width: u32, window_height: u32) -> Result<HaarFeature, CascadeError> {
    if let Some(tilted) = element_children(node).find(|c| c.has_tag_name("tilted")) {
        if node_text(tilted).trim() != "0" {
            return Err(CascadeError::Unsupported("tilted Haar features".into()));
        }
    }

    let window = Rect::new(0, 0, window_width as i32, window_height as i32);
    let rects = element_children(child(node, "rects")?)
        .map(|r| {
            let values: Vec<f64> = parse_list(r, "feature rect")?;
            let [x, y, w, h, weight] = values[..] else {
                return Err(CascadeError::Malformed(format!(
                    "feature rect needs 5 values, got {}",
                    values.len()
                )));
            };
            let rect = Rect::new(x as i32, y as i32, w as i32, h as i32);
            if rect.is_empty() || !window.contains_rect(&rect) {
                return Err(CascadeError::Malformed(format!(
                    "feature rect {rect:?} outside {window_width}x{window_height} window"
                )));
            }
            Ok((rect, weight))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if rects.is_empty() {
        return Err(CascadeError::Malformed("feature without rects".into()));
    }
    Ok(HaarFeature { rects })
}

fn parse_stage(node: Node, feature_count: usize) -> Result<Stage, CascadeError> {
    let threshold: f64 = child_value(node, "stageThreshold")?;
    let classifiers = element_children(child(node, "weakClassifiers")?)
        .map(|w| parse_weak_classifier(w, feature_count))
        .collect::<Result<Vec<_>, _>>()?;
    if classifiers.is_empty() {
        return Err(CascadeError::Malformed("stage without weak classifiers".into()));
    }
    Ok(Stage {
        threshold,
        classifiers,
    })
}

fn parse_weak_classifier(node: Node, feature_count: usize) -> Result<WeakClassifier, CascadeError> {
    let raw: Vec<f64> = parse_list(child(node, "internalNodes")?, "internal node")?;
    let leaves: Vec<f64> = parse_list(child(node, "leafValues")?, "leaf value")?;

    if raw.is_empty() || raw.len() % 4 != 0 {
        return Err(CascadeError::Malformed(format!(
            "internalNodes must hold groups of 4 values, got {}",
            raw.len()
        )));
    }

    let nodes: Vec<TreeNode> = raw
        .chunks_exact(4)
        .map(|c| TreeNode {
            left: c[0] as i32,
            right: c[1] as i32,
            feature: c[2] as usize,
            threshold: c[3],
        })
        .collect();

    // Children must point forward so evaluation always terminates.
    for (i, n) in nodes.iter().enumerate() {
        if n.feature >= feature_count {
            return Err(CascadeError::Malformed(format!(
                "feature index {} out of range ({feature_count} features)",
                n.feature
            )));
        }
        for next in [n.left, n.right] {
            let valid = if next <= 0 {
                ((-next) as usize) < leaves.len()
            } else {
                (next as usize) > i && (next as usize) < nodes.len()
            };
            if !valid {
                return Err(CascadeError::Malformed(format!(
                    "node {i} has invalid child {next}"
                )));
            }
        }
    }

    Ok(WeakClassifier { nodes, leaves })
}

/// Summed-area tables of pixel values and squared pixel values.
struct Integral {
    stride: usize,
    sum: Vec<u64>,
    sq_sum: Vec<u64>,
}

impl Integral {
    fn new(gray: &GrayImage) -> Self {
        let w = gray.width() as usize;
        let h = gray.height() as usize;
        let stride = w + 1;
        let mut sum = vec![0u64; stride * (h + 1)];
        let mut sq_sum = vec![0u64; stride * (h + 1)];
        let raw = gray.as_raw();

        for y in 0..h {
            let mut row = 0u64;
            let mut row_sq = 0u64;
            for x in 0..w {
                let v = raw[y * w + x] as u64;
                row += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + (x + 1);
                sum[idx] = sum[idx - stride] + row;
                sq_sum[idx] = sq_sum[idx - stride] + row_sq;
            }
        }

        Self { stride, sum, sq_sum }
    }

    fn rect(table: &[u64], stride: usize, x: usize, y: usize, w: usize, h: usize) -> u64 {
        let (x1, y1) = (x + w, y + h);
        table[y1 * stride + x1] + table[y * stride + x] - table[y1 * stride + x] - table[y * stride + x1]
    }

    fn sum(&self, x: usize, y: usize, w: usize, h: usize) -> u64 {
        Self::rect(&self.sum, self.stride, x, y, w, h)
    }

    fn sq_sum(&self, x: usize, y: usize, w: usize, h: usize) -> u64 {
        Self::rect(&self.sq_sum, self.stride, x, y, w, h)
    }
}

/// [`HaarCascade`] bound to its search parameters.
pub struct CascadeDetector {
    cascade: HaarCascade,
    params: DetectionParams,
}

impl CascadeDetector {
    pub fn new(cascade: HaarCascade, params: DetectionParams) -> Result<Self, CascadeError> {
        if !(params.scale_factor > 1.0) {
            return Err(CascadeError::InvalidParams(format!(
                "scale_factor must be > 1.0, got {}",
                params.scale_factor
            )));
        }
        Ok(Self { cascade, params })
    }

    /// Load a cascade file and bind it to `params`.
    pub fn load(path: impl AsRef<Path>, params: DetectionParams) -> Result<Self, CascadeError> {
        Self::new(HaarCascade::load(path)?, params)
    }
}

impl Detector for CascadeDetector {
    fn detect(&self, gray: &GrayImage, region: Option<Rect>) -> Vec<Rect> {
        match crop_region(gray, region) {
            Some(view) => self.cascade.detect_multi_scale(&view, &self.params),
            None => Vec::new(),
        }
    }
}
