//! Mesh line grading.
//!
//! [`smooth_lines`] inserts lines between fixed lines so that no interval is
//! larger than `max_res` and adjacent intervals never differ by more than
//! `ratio`. Fixed lines are never moved or removed.
//!
//! A greedy pass fills offending intervals with two-sided geometric ramps. It
//! produces few lines but can leave violations around clusters of closely
//! spaced fixed lines; in that case the fixed lines are graded again with
//! [`grade_bounded`], which always satisfies both constraints.

use itertools::Itertools;

/// Lines closer than this are merged, in micrometres.
pub const DEDUP_TOLERANCE: f64 = 1e-3;

const MAX_GREEDY_PASSES: usize = 32;
const REL_TOL: f64 = 1e-9;

/// Sorts lines and merges those closer than [`DEDUP_TOLERANCE`].
pub fn dedup_lines(lines: impl IntoIterator<Item = f64>) -> Vec<f64> {
    let mut lines: Vec<f64> = lines.into_iter().filter(|x| x.is_finite()).collect();
    lines.sort_by(f64::total_cmp);
    lines.dedup_by(|a, b| (*a - *b).abs() < DEDUP_TOLERANCE);
    lines
}

/// Whether every interval is at most `max_res` and every adjacent pair of
/// intervals is within `ratio` of each other.
pub fn is_graded(lines: &[f64], max_res: f64, ratio: f64) -> bool {
    let intervals: Vec<f64> = lines.windows(2).map(|w| w[1] - w[0]).collect();
    intervals.iter().all(|&d| d > 0.0 && d <= max_res * (1.0 + REL_TOL))
        && intervals
            .iter()
            .tuple_windows()
            .all(|(&a, &b)| a.max(b) <= ratio * a.min(b) * (1.0 + REL_TOL))
}

pub fn smooth_lines(fixed: &[f64], max_res: f64, ratio: f64) -> Vec<f64> {
    let fixed = dedup_lines(fixed.iter().copied());
    if fixed.len() < 2 {
        return fixed;
    }

    let greedy = smooth_greedy(fixed.clone(), max_res, ratio);
    if is_graded(&greedy, max_res, ratio) {
        greedy
    } else {
        log::debug!(
            "greedy mesh grading left violations around {} fixed lines; using bounded grading",
            fixed.len()
        );
        grade_bounded(&fixed, max_res, ratio)
    }
}

fn smooth_greedy(mut lines: Vec<f64>, max_res: f64, ratio: f64) -> Vec<f64> {
    for _ in 0..MAX_GREEDY_PASSES {
        let intervals: Vec<f64> = lines.windows(2).map(|w| w[1] - w[0]).collect();
        let mut out = Vec::with_capacity(lines.len());
        out.push(lines[0]);
        let mut changed = false;

        for (k, &d) in intervals.iter().enumerate() {
            let left = k.checked_sub(1).map(|j| intervals[j]);
            let right = intervals.get(k + 1).copied();
            let limit = [left, right]
                .into_iter()
                .flatten()
                .map(|n| n * ratio)
                .fold(max_res, f64::min);

            if d > limit * (1.0 + REL_TOL) {
                let pieces = grade_range(
                    d,
                    left.unwrap_or(max_res).min(max_res),
                    right.unwrap_or(max_res).min(max_res),
                    max_res,
                    ratio,
                );
                let mut x = lines[k];
                for piece in &pieces[..pieces.len() - 1] {
                    x += piece;
                    out.push(x);
                }
                changed = true;
            }
            out.push(lines[k + 1]);
        }

        lines = out;
        if !changed {
            break;
        }
    }
    lines
}

/// Splits an interval of length `len` into pieces that grow geometrically
/// from the `left` and `right` neighbour sizes towards `max_res`.
fn grade_range(len: f64, left: f64, right: f64, max_res: f64, ratio: f64) -> Vec<f64> {
    // Leave headroom at both ends and between pieces for the final rescale.
    let growth = ratio.powf(0.9);
    let mut lhs = Vec::new();
    let mut rhs = Vec::new();
    let mut next_l = (left * ratio.sqrt()).min(max_res);
    let mut next_r = (right * ratio.sqrt()).min(max_res);
    let mut used = 0.0;

    loop {
        let take_left = next_l <= next_r;
        let next = next_l.min(next_r);
        if used + next > len {
            break;
        }
        used += next;
        if take_left {
            lhs.push(next);
            next_l = (next_l * growth).min(max_res);
        } else {
            rhs.push(next);
            next_r = (next_r * growth).min(max_res);
        }
    }

    if lhs.is_empty() && rhs.is_empty() {
        return vec![len];
    }

    let junction = lhs.len();
    let extra = next_l.min(next_r);
    let stretch = len / used;
    let shrink = len / (used + extra);
    let mut pieces: Vec<f64> = lhs.into_iter().chain(rhs.into_iter().rev()).collect();
    let scale = if stretch.ln().abs() <= shrink.ln().abs() {
        stretch
    } else {
        pieces.insert(junction, extra);
        shrink
    };
    pieces.iter_mut().for_each(|p| *p *= scale);
    pieces
}

/// Grades the gaps between fixed lines with guaranteed bounds.
///
/// Each gap is either kept as a single interval or filled by equidistributing
/// a piecewise-linear size field `ψ` with slope `s`. Filled gaps cap `ψ` at
/// `s·g` so they always receive at least `1/s` pieces, which bounds how far
/// the discretisation can stray from `ψ`. With `q = 1 + s` chosen so that
/// `q²/(2 − q)` equals the target ratio, every adjacent pair of intervals,
/// including pairs across fixed lines, stays within the ratio.
pub fn grade_bounded(fixed: &[f64], max_res: f64, ratio: f64) -> Vec<f64> {
    let lines = dedup_lines(fixed.iter().copied());
    if lines.len() < 2 {
        return lines;
    }

    let r = 1.0 + (ratio - 1.0) * 0.99;
    let q = (-r + (r * r + 8.0 * r).sqrt()) / 2.0;
    let s = q - 1.0;
    let cap = max_res * (2.0 - q);

    let gaps: Vec<f64> = lines.windows(2).map(|w| w[1] - w[0]).collect();
    let n = gaps.len();
    let mut single: Vec<bool> = gaps.iter().map(|&g| g <= max_res).collect();

    loop {
        let mut changed = false;
        for i in 0..n.saturating_sub(1) {
            if single[i] && single[i + 1] {
                if gaps[i] > r * gaps[i + 1] {
                    single[i] = false;
                    changed = true;
                } else if gaps[i + 1] > r * gaps[i] {
                    single[i + 1] = false;
                    changed = true;
                }
            }
        }
        for i in 0..n {
            if single[i] {
                continue;
            }
            let limit = cap.min(s * gaps[i]);
            for j in [i.wrapping_sub(1), i + 1] {
                if j < n && single[j] && gaps[j] > limit {
                    single[j] = false;
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    let point_size = |p: usize| -> f64 {
        [p.wrapping_sub(1), p]
            .into_iter()
            .filter(|&j| j < n && !single[j])
            .map(|j| s * gaps[j])
            .fold(cap, f64::min)
    };

    let mut out = Vec::with_capacity(lines.len());
    for i in 0..n {
        out.push(lines[i]);
        if single[i] {
            continue;
        }
        let ea = if i > 0 && single[i - 1] {
            gaps[i - 1]
        } else {
            point_size(i)
        };
        let eb = if i + 1 < n && single[i + 1] {
            gaps[i + 1]
        } else {
            point_size(i + 1)
        };
        let field = SizeField::new(gaps[i], ea, eb, cap.min(s * gaps[i]), s);
        out.extend(field.equidistribute().into_iter().map(|x| lines[i] + x));
    }
    out.push(lines[n]);
    out
}

/// `ψ(x) = min(cap, ea + s·x, eb + s·(len − x))` on `[0, len]`.
struct SizeField {
    len: f64,
    segments: Vec<Segment>,
}

/// A piece of the size field where `ψ(x) = alpha + beta·x`.
#[derive(Debug, Clone, Copy)]
struct Segment {
    x0: f64,
    x1: f64,
    alpha: f64,
    beta: f64,
}

impl Segment {
    #[inline]
    fn psi(&self, x: f64) -> f64 {
        self.alpha + self.beta * x
    }

    /// `∫ dx/ψ` over the segment.
    fn density(&self) -> f64 {
        if self.beta == 0.0 {
            (self.x1 - self.x0) / self.alpha
        } else {
            (self.psi(self.x1) / self.psi(self.x0)).ln() / self.beta
        }
    }

    /// Position where `∫ dx/ψ` from `x0` reaches `phi`.
    fn invert(&self, phi: f64) -> f64 {
        if self.beta == 0.0 {
            self.x0 + phi * self.alpha
        } else {
            self.x0 + self.psi(self.x0) * ((self.beta * phi).exp() - 1.0) / self.beta
        }
    }
}

impl SizeField {
    fn new(len: f64, ea: f64, eb: f64, cap: f64, s: f64) -> Self {
        let pieces = [(cap, 0.0), (ea, s), (eb + s * len, -s)];
        let psi = |x: f64| {
            pieces
                .iter()
                .map(|(a, b)| a + b * x)
                .fold(f64::INFINITY, f64::min)
        };

        let mut breaks = vec![0.0, len];
        breaks.extend(
            [
                (cap - ea) / s,
                len - (cap - eb) / s,
                (eb - ea + s * len) / (2.0 * s),
            ]
            .into_iter()
            .filter(|x| *x > 0.0 && *x < len),
        );
        breaks.sort_by(f64::total_cmp);

        let segments = breaks
            .windows(2)
            .filter(|w| w[1] > w[0])
            .map(|w| {
                let mid = (w[0] + w[1]) / 2.0;
                let target = psi(mid);
                let (alpha, beta) = pieces
                    .iter()
                    .copied()
                    .min_by(|(a1, b1), (a2, b2)| {
                        (a1 + b1 * mid - target)
                            .abs()
                            .total_cmp(&(a2 + b2 * mid - target).abs())
                    })
                    .unwrap_or((cap, 0.0));
                Segment {
                    x0: w[0],
                    x1: w[1],
                    alpha,
                    beta,
                }
            })
            .collect();

        Self { len, segments }
    }

    /// Interior line positions splitting `[0, len]` into pieces of equal density.
    fn equidistribute(&self) -> Vec<f64> {
        let densities: Vec<f64> = self.segments.iter().map(Segment::density).collect();
        let total: f64 = densities.iter().sum();
        let count = (total - 1e-9).ceil().max(1.0) as usize;
        let step = total / count as f64;

        let mut out = Vec::with_capacity(count.saturating_sub(1));
        let mut seg = 0;
        let mut acc = 0.0;
        for k in 1..count {
            let target = step * k as f64;
            while seg + 1 < self.segments.len() && acc + densities[seg] < target {
                acc += densities[seg];
                seg += 1;
            }
            let x = self.segments[seg].invert(target - acc);
            out.push(x.clamp(0.0, self.len));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(lines: &[f64], max_res: f64, ratio: f64) {
        let intervals: Vec<f64> = lines.windows(2).map(|w| w[1] - w[0]).collect();
        for &d in &intervals {
            assert!(d > 0.0, "non-increasing lines");
            assert!(d <= max_res * (1.0 + 1e-6), "interval {d} exceeds {max_res}");
        }
        for (a, b) in intervals.iter().tuple_windows() {
            let r = a.max(*b) / a.min(*b);
            assert!(r <= ratio * (1.0 + 1e-6), "adjacent ratio {r} exceeds {ratio}");
        }
    }

    fn contains_all(lines: &[f64], fixed: &[f64]) {
        for f in fixed {
            assert!(
                lines.iter().any(|l| (l - f).abs() < DEDUP_TOLERANCE),
                "fixed line {f} missing"
            );
        }
    }

    #[test]
    fn test_dedup_lines() {
        let lines = dedup_lines([3.0, 1.0, 1.0005, 2.0, f64::NAN, 3.0]);
        assert_eq!(lines, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_uniform_lines_untouched() {
        let fixed: Vec<f64> = (0..20).map(|i| i as f64 * 50.0).collect();
        let lines = smooth_lines(&fixed, 200.0, 1.5);
        assert_eq!(lines, fixed);
    }

    #[test]
    fn test_margin_grading() {
        let mut fixed: Vec<f64> = (0..=40).map(|i| i as f64 * 50.0).collect();
        fixed.push(-3000.0);
        fixed.push(5000.0);
        for ratio in [1.2, 1.5, 2.0, 3.0] {
            let lines = smooth_lines(&fixed, 200.0, ratio);
            check(&lines, 200.0, ratio);
            contains_all(&lines, &fixed);
        }
    }

    #[test]
    fn test_clustered_lines() {
        let fixed = [
            -3000.0, 0.0, 50.0, 67.0, 100.0, 100.5, 150.0, 151.0, 1000.0, 1000.002, 1002.0,
            4000.0,
        ];
        for ratio in [1.05, 1.1, 1.3, 1.5, 2.0, 4.0] {
            for max_res in [20.0, 200.0, 1000.0] {
                let lines = smooth_lines(&fixed, max_res, ratio);
                check(&lines, max_res, ratio);
                contains_all(&lines, &fixed);
            }
        }
    }

    #[test]
    fn test_bounded_grading_directly() {
        let fixed = [0.0, 0.3, 1.0, 2.5, 2.51, 50.0, 51.0, 300.0, 1200.0];
        for ratio in [1.01, 1.2, 1.5, 2.0, 3.0] {
            for max_res in [5.0, 50.0, 500.0] {
                let lines = grade_bounded(&fixed, max_res, ratio);
                check(&lines, max_res, ratio);
                contains_all(&lines, &fixed);
            }
        }
    }

    #[test]
    fn test_single_line() {
        assert_eq!(smooth_lines(&[5.0], 1.0, 2.0), vec![5.0]);
        assert!(smooth_lines(&[], 1.0, 2.0).is_empty());
    }
}
