//! CTC negative log-likelihood over host-side probabilities.

const MIN_PROB: f64 = 1e-30;

fn log_add(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let max = a.max(b);
    max + ((a - max).exp() + (b - max).exp()).ln()
}

/// `-ln p(target | probabilities)` for one example.
///
/// `probabilities` is row-major `[timesteps, classes]` and already normalized
/// per frame. `target` must not contain `blank`. Returns `+inf` when no
/// alignment fits in the available frames.
pub fn ctc_negative_log_likelihood(
    probabilities: &[f32],
    classes: usize,
    target: &[i64],
    blank: i64,
) -> f64 {
    let frames: Vec<&[f32]> = probabilities.chunks(classes).collect();
    if frames.is_empty() {
        return if target.is_empty() { 0.0 } else { f64::INFINITY };
    }

    // Target with a blank before, between and after every label.
    let mut extended = Vec::with_capacity(2 * target.len() + 1);
    extended.push(blank);
    for &label in target {
        extended.push(label);
        extended.push(blank);
    }

    let log_prob = |frame: &[f32], class: i64| -> f64 {
        frame
            .get(class as usize)
            .map(|&p| f64::from(p).max(MIN_PROB).ln())
            .unwrap_or(MIN_PROB.ln())
    };

    let mut alpha = vec![f64::NEG_INFINITY; extended.len()];
    alpha[0] = log_prob(frames[0], extended[0]);
    if extended.len() > 1 {
        alpha[1] = log_prob(frames[0], extended[1]);
    }

    for frame in frames.iter().skip(1) {
        let mut next = vec![f64::NEG_INFINITY; extended.len()];
        for s in 0..extended.len() {
            let mut acc = alpha[s];
            if s >= 1 {
                acc = log_add(acc, alpha[s - 1]);
            }
            if s >= 2 && extended[s] != blank && extended[s] != extended[s - 2] {
                acc = log_add(acc, alpha[s - 2]);
            }
            if acc != f64::NEG_INFINITY {
                next[s] = acc + log_prob(frame, extended[s]);
            }
        }
        alpha = next;
    }

    let last = extended.len() - 1;
    let mut total = alpha[last];
    if last >= 1 {
        total = log_add(total, alpha[last - 1]);
    }
    -total
}
