//! Line-segment extraction from an edge mask.
//!
//! `imageproc::hough::detect_lines` returns unbounded polar lines at a fixed
//! 1px/1° resolution. Barline splitting needs finite segments with a
//! configurable resolution, minimum length and gap tolerance, so the
//! accumulator is built here and each peak line is walked over the mask to
//! cut it into segments. Pixels claimed by an accepted segment do not feed
//! later segments.

use image::GrayImage;
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoughParams {
    /// Distance resolution in pixels.
    pub rho: f64,
    /// Angle resolution in radians.
    pub theta: f64,
    pub min_votes: u32,
    pub min_line_length: f64,
    pub max_line_gap: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSegment {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl LineSegment {
    pub fn length(&self) -> f64 {
        let dx = (self.x2 - self.x1) as f64;
        let dy = (self.y2 - self.y1) as f64;
        (dx * dx + dy * dy).sqrt()
    }

    /// Horizontal distance between the endpoints.
    pub fn dx(&self) -> i32 {
        (self.x2 - self.x1).abs()
    }
}

struct Accumulator {
    votes: Vec<u32>,
    n_theta: usize,
    n_rho: usize,
    rho_offset: i64,
    cos: Vec<f64>,
    sin: Vec<f64>,
}

impl Accumulator {
    fn build(points: &[(i32, i32)], width: u32, height: u32, params: &HoughParams) -> Self {
        let n_theta = ((PI / params.theta).round() as usize).max(1);
        let diagonal = ((width as f64).powi(2) + (height as f64).powi(2)).sqrt();
        let half = (diagonal / params.rho).ceil() as i64;
        let n_rho = (2 * half + 1) as usize;
        let cos: Vec<f64> = (0..n_theta).map(|k| (k as f64 * params.theta).cos()).collect();
        let sin: Vec<f64> = (0..n_theta).map(|k| (k as f64 * params.theta).sin()).collect();

        let mut votes = vec![0u32; n_theta * n_rho];
        for &(x, y) in points {
            for k in 0..n_theta {
                let r = x as f64 * cos[k] + y as f64 * sin[k];
                let bin = (r / params.rho).round() as i64 + half;
                if (0..n_rho as i64).contains(&bin) {
                    votes[k * n_rho + bin as usize] += 1;
                }
            }
        }

        Self {
            votes,
            n_theta,
            n_rho,
            rho_offset: half,
            cos,
            sin,
        }
    }

    fn get(&self, k: i64, bin: i64) -> u32 {
        if k < 0 || bin < 0 || k >= self.n_theta as i64 || bin >= self.n_rho as i64 {
            return 0;
        }
        self.votes[k as usize * self.n_rho + bin as usize]
    }

    /// Local maxima at or above `min_votes`, strongest first. On plateaus
    /// only the first cell in scan order counts.
    fn peaks(&self, min_votes: u32) -> Vec<(usize, usize, u32)> {
        let mut peaks = Vec::new();
        for k in 0..self.n_theta as i64 {
            for bin in 0..self.n_rho as i64 {
                let v = self.get(k, bin);
                if v < min_votes.max(1) {
                    continue;
                }
                let mut is_peak = true;
                'scan: for dk in -1..=1i64 {
                    for db in -1..=1i64 {
                        if dk == 0 && db == 0 {
                            continue;
                        }
                        let n = self.get(k + dk, bin + db);
                        let earlier = (dk, db) < (0, 0);
                        if n > v || (earlier && n == v) {
                            is_peak = false;
                            break 'scan;
                        }
                    }
                }
                if is_peak {
                    peaks.push((k as usize, bin as usize, v));
                }
            }
        }
        peaks.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)).then(a.1.cmp(&b.1)));
        peaks
    }
}

/// Extract line segments from a mask where non-zero pixels are edges.
pub fn detect_segments(edges: &GrayImage, params: &HoughParams) -> Vec<LineSegment> {
    let (width, height) = edges.dimensions();
    let points: Vec<(i32, i32)> = edges
        .enumerate_pixels()
        .filter(|(_, _, p)| p[0] > 0)
        .map(|(x, y, _)| (x as i32, y as i32))
        .collect();
    if points.is_empty() || params.rho <= 0.0 || params.theta <= 0.0 {
        return Vec::new();
    }

    let acc = Accumulator::build(&points, width, height, params);
    let mut used = vec![false; (width * height) as usize];
    let mut segments = Vec::new();

    for (k, bin, _) in acc.peaks(params.min_votes) {
        let r = (bin as i64 - acc.rho_offset) as f64 * params.rho;
        let (cos, sin) = (acc.cos[k], acc.sin[k]);
        let mut walker = SegmentWalker::new(params);

        // Step along whichever axis the line crosses more steeply.
        if cos.abs() >= sin.abs() {
            for y in 0..height as i32 {
                let x = ((r - y as f64 * sin) / cos).round() as i32;
                walker.step((x, y), edges, &used, &mut segments);
            }
        } else {
            for x in 0..width as i32 {
                let y = ((r - x as f64 * cos) / sin).round() as i32;
                walker.step((x, y), edges, &used, &mut segments);
            }
        }
        walker.finish(&mut segments);

        for &(x, y) in &walker.claimed {
            used[(y as u32 * width + x as u32) as usize] = true;
        }
    }
    segments
}

struct SegmentWalker {
    min_length: f64,
    max_gap: u32,
    start: Option<(i32, i32)>,
    end: (i32, i32),
    gap: u32,
    pending: Vec<(i32, i32)>,
    claimed: Vec<(i32, i32)>,
}

impl SegmentWalker {
    fn new(params: &HoughParams) -> Self {
        Self {
            min_length: params.min_line_length,
            max_gap: params.max_line_gap,
            start: None,
            end: (0, 0),
            gap: 0,
            pending: Vec::new(),
            claimed: Vec::new(),
        }
    }

    fn step(&mut self, p: (i32, i32), edges: &GrayImage, used: &[bool], out: &mut Vec<LineSegment>) {
        let (width, height) = edges.dimensions();
        let inside = p.0 >= 0 && p.1 >= 0 && (p.0 as u32) < width && (p.1 as u32) < height;
        let hit = inside
            && edges.get_pixel(p.0 as u32, p.1 as u32)[0] > 0
            && !used[(p.1 as u32 * width + p.0 as u32) as usize];

        if hit {
            if self.start.is_none() {
                self.start = Some(p);
            }
            self.end = p;
            self.gap = 0;
            self.pending.push(p);
        } else if self.start.is_some() {
            self.gap += 1;
            if self.gap > self.max_gap {
                self.finish(out);
            }
        }
    }

    fn finish(&mut self, out: &mut Vec<LineSegment>) {
        if let Some(start) = self.start.take() {
            let segment = LineSegment {
                x1: start.0,
                y1: start.1,
                x2: self.end.0,
                y2: self.end.1,
            };
            if segment.length() >= self.min_length {
                out.push(segment);
                self.claimed.append(&mut self.pending);
            }
        }
        self.pending.clear();
        self.gap = 0;
    }
}
