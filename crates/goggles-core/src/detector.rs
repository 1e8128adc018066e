//! Object detection seam.
//!
//! The overlay pipeline only needs "rectangles likely to contain a face (or
//! an eye) inside this region". [`Detector`] is that capability; the Haar
//! cascade in [`crate::cascade`] is one implementation, tests use fixed
//! rectangles.

use crate::types::Rect;
use image::{imageops, GrayImage};
use serde::{Deserialize, Serialize};

const GROUP_EPS: f64 = 0.2;

/// Pluggable detector.
///
/// Returned rectangles are relative to `region` when one is given, otherwise
/// to the whole frame. No ordering guarantee, no confidence score.
pub trait Detector: Send + Sync {
    fn detect(&self, gray: &GrayImage, region: Option<Rect>) -> Vec<Rect>;
}

/// Multi-scale search parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionParams {
    /// Pyramid step between scales; must be greater than 1.
    pub scale_factor: f64,
    /// Raw hits a cluster needs beyond this count to be reported.
    pub min_neighbors: usize,
    /// Smallest window side in pixels (0 = the cascade's own window).
    pub min_size: u32,
    /// Largest window side in pixels (0 = unbounded).
    pub max_size: u32,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 3,
            min_size: 0,
            max_size: 0,
        }
    }
}

/// Copy out the search region, or the whole frame when `region` is `None`.
///
/// Returns `None` for an empty region or one that leaves the frame.
pub fn crop_region(gray: &GrayImage, region: Option<Rect>) -> Option<GrayImage> {
    let Some(r) = region else {
        return Some(gray.clone());
    };
    if !r.fits_within(gray.width(), gray.height()) {
        tracing::warn!(region = ?r, width = gray.width(), height = gray.height(), "search region outside frame");
        return None;
    }
    Some(imageops::crop_imm(gray, r.x as u32, r.y as u32, r.width as u32, r.height as u32).to_image())
}

/// Two raw hits belong to the same object when every edge is within `delta`.
fn similar(a: &Rect, b: &Rect, eps: f64) -> bool {
    let delta = eps * (a.width.min(b.width) as f64 + a.height.min(b.height) as f64) * 0.5;
    let near = |u: i64, v: i64| ((u - v) as f64).abs() <= delta;
    near(a.x as i64, b.x as i64)
        && near(a.y as i64, b.y as i64)
        && near(a.right(), b.right())
        && near(a.bottom(), b.bottom())
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Merge raw window hits into object rectangles.
///
/// Clusters similar rectangles, averages each cluster, drops clusters with
/// `min_neighbors` or fewer members and drops clusters nested inside a
/// stronger one. `min_neighbors == 0` returns the input unchanged.
pub fn group_rectangles(rects: &[Rect], min_neighbors: usize) -> Vec<Rect> {
    group_rectangles_eps(rects, min_neighbors, GROUP_EPS)
}

fn group_rectangles_eps(rects: &[Rect], min_neighbors: usize, eps: f64) -> Vec<Rect> {
    if min_neighbors == 0 || rects.is_empty() {
        return rects.to_vec();
    }

    let n = rects.len();
    let mut parent: Vec<usize> = (0..n).collect();
    for i in 0..n {
        for j in 0..i {
            if similar(&rects[i], &rects[j], eps) {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[ri] = rj;
                }
            }
        }
    }

    // Class index per root, in order of first appearance.
    let mut class_of_root = vec![usize::MAX; n];
    let mut sums: Vec<[i64; 4]> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();
    for (i, r) in rects.iter().enumerate() {
        let root = find(&mut parent, i);
        if class_of_root[root] == usize::MAX {
            class_of_root[root] = sums.len();
            sums.push([0; 4]);
            counts.push(0);
        }
        let c = class_of_root[root];
        sums[c][0] += r.x as i64;
        sums[c][1] += r.y as i64;
        sums[c][2] += r.width as i64;
        sums[c][3] += r.height as i64;
        counts[c] += 1;
    }

    let averaged: Vec<Rect> = sums
        .iter()
        .zip(&counts)
        .map(|(s, &count)| {
            let avg = |v: i64| (v as f64 / count as f64).round() as i32;
            Rect::new(avg(s[0]), avg(s[1]), avg(s[2]), avg(s[3]))
        })
        .collect();

    let mut grouped = Vec::new();
    for (i, r1) in averaged.iter().enumerate() {
        let n1 = counts[i];
        if n1 <= min_neighbors {
            continue;
        }
        let nested = averaged.iter().enumerate().any(|(j, r2)| {
            let n2 = counts[j];
            if j == i || n2 <= min_neighbors {
                return false;
            }
            let dx = (r2.width as f64 * eps).round() as i64;
            let dy = (r2.height as f64 * eps).round() as i64;
            r1.x as i64 >= r2.x as i64 - dx
                && r1.y as i64 >= r2.y as i64 - dy
                && r1.right() <= r2.right() + dx
                && r1.bottom() <= r2.bottom() + dy
                && (n2 > n1.max(3) || n1 < 3)
        });
        if !nested {
            grouped.push(*r1);
        }
    }

    grouped
}
