//! Pixel footprints of detected objects.
//!
//! A footprint is the set of pixels attributed to one object, stored as
//! sorted row spans plus the detection peaks. Footprints coming out of a
//! deblender additionally carry per-child footprints describing how a
//! blended parent was split; `flatten` collapses that hierarchy back into
//! the plain pixel set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::core::geom::PixelBox;

/// A horizontal run of pixels on one image row, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub y: i32,
    pub x0: i32,
    pub x1: i32,
}

impl Span {
    #[must_use]
    pub fn new(y: i32, x0: i32, x1: i32) -> Self {
        Self { y, x0, x1 }
    }

    #[must_use]
    #[allow(clippy::cast_sign_loss)] // Guarded by the emptiness check
    pub fn len(&self) -> u64 {
        if self.x1 < self.x0 {
            0
        } else {
            (self.x1 - self.x0 + 1) as u64
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x1 < self.x0
    }
}

/// A detection peak inside a footprint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub x: i32,
    pub y: i32,

    /// Peak pixel value at detection time
    pub value: f64,
}

/// The set of pixels associated with one detected object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Footprint {
    /// Row spans, sorted by (y, x0), non-overlapping
    pub spans: Vec<Span>,

    /// Detection peaks, brightest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub peaks: Vec<Peak>,

    /// Deblend children, present only for blended parents
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Footprint>,
}

impl Footprint {
    /// An empty footprint: no pixels, no peaks, no children.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a footprint from an arbitrary span list, normalizing it into
    /// sorted, non-overlapping spans.
    #[must_use]
    pub fn from_spans(spans: Vec<Span>) -> Self {
        Self::from_pixels(
            spans
                .iter()
                .filter(|s| !s.is_empty())
                .flat_map(|s| (s.x0..=s.x1).map(move |x| (x, s.y))),
        )
    }

    /// Build a footprint from individual (x, y) pixels, deduplicated and
    /// compressed into spans.
    #[must_use]
    pub fn from_pixels(pixels: impl IntoIterator<Item = (i32, i32)>) -> Self {
        let set: BTreeSet<(i32, i32)> = pixels.into_iter().map(|(x, y)| (y, x)).collect();
        Self {
            spans: compress_pixels(&set),
            peaks: Vec::new(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.iter().all(Span::is_empty)
    }

    /// Number of pixels covered by this footprint's own spans.
    #[must_use]
    pub fn area(&self) -> u64 {
        self.spans.iter().map(Span::len).sum()
    }

    #[must_use]
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Tight bounding box of this footprint's own spans.
    #[must_use]
    pub fn bbox(&self) -> PixelBox {
        let mut bbox = PixelBox::empty();
        for span in &self.spans {
            if span.is_empty() {
                continue;
            }
            if bbox.is_empty() {
                bbox = PixelBox::new(span.x0, span.y, span.x1, span.y);
            } else {
                bbox.x_min = bbox.x_min.min(span.x0);
                bbox.x_max = bbox.x_max.max(span.x1);
                bbox.y_min = bbox.y_min.min(span.y);
                bbox.y_max = bbox.y_max.max(span.y);
            }
        }
        bbox
    }

    /// Collapse the deblend hierarchy: the result covers the union of this
    /// footprint's spans and all descendant spans, carries the same peaks,
    /// and has no children.
    #[must_use]
    pub fn flatten(&self) -> Footprint {
        let mut pixels: BTreeSet<(i32, i32)> = BTreeSet::new();
        self.collect_pixels(&mut pixels);
        Footprint {
            spans: compress_pixels(&pixels),
            peaks: self.peaks.clone(),
            children: Vec::new(),
        }
    }

    fn collect_pixels(&self, out: &mut BTreeSet<(i32, i32)>) {
        for span in &self.spans {
            if !span.is_empty() {
                for x in span.x0..=span.x1 {
                    out.insert((span.y, x));
                }
            }
        }
        for child in &self.children {
            child.collect_pixels(out);
        }
    }

    /// Iterate over every (x, y) pixel of this footprint's own spans.
    pub fn pixels(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.spans
            .iter()
            .filter(|s| !s.is_empty())
            .flat_map(|s| (s.x0..=s.x1).map(move |x| (x, s.y)))
    }
}

/// Compress a sorted (y, x) pixel set into row spans.
fn compress_pixels(pixels: &BTreeSet<(i32, i32)>) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut current: Option<Span> = None;
    for &(y, x) in pixels {
        match current {
            Some(ref mut span) if span.y == y && span.x1 + 1 == x => span.x1 = x,
            Some(span) => {
                spans.push(span);
                current = Some(Span::new(y, x, x));
            }
            None => current = Some(Span::new(y, x, x)),
        }
    }
    if let Some(span) = current {
        spans.push(span);
    }
    spans
}
