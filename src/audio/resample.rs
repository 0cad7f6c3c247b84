//! # Resampling
//!
//! Linear-interpolation resampler from the client's reported hardware rate
//! to the speech model's target rate. Browser capture typically arrives at
//! 44.1kHz or 48kHz; the model wants 16kHz mono.

/// Resample `input` from `source_rate` to `target_rate` by linear
/// interpolation.
///
/// Output length is `floor(len * target / source)`, which keeps total
/// duration within one sample of the input's. Identity when the rates
/// already match.
pub fn resample(input: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || input.is_empty() {
        return input.to_vec();
    }

    let out_len = (input.len() as u64 * target_rate as u64 / source_rate as u64) as usize;
    let ratio = source_rate as f64 / target_rate as f64;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let pos = i as f64 * ratio;
        let idx = pos as usize;
        if idx >= input.len() {
            break;
        }
        let frac = (pos - idx as f64) as f32;
        let a = input[idx];
        let b = if idx + 1 < input.len() { input[idx + 1] } else { a };
        output.push(a + (b - a) * frac);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn duration_secs(len: usize, rate: u32) -> f64 {
        len as f64 / rate as f64
    }

    #[test]
    fn identity_when_rates_match() {
        let input = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&input, 16000, 16000), input);
    }

    #[test]
    fn preserves_duration_within_one_sample() {
        for source in [8000u32, 22050, 44100, 48000] {
            let input = vec![0.0f32; source as usize * 3]; // 3 seconds
            let output = resample(&input, source, 16000);

            let diff = (duration_secs(output.len(), 16000)
                - duration_secs(input.len(), source))
            .abs();
            assert!(
                diff <= 1.0 / 16000.0,
                "{}Hz -> 16kHz drifted by {}s",
                source,
                diff
            );
        }
    }

    #[test]
    fn interpolates_between_neighbors() {
        // Doubling the rate should place midpoints between input samples.
        let input = vec![0.0, 1.0];
        let output = resample(&input, 1, 2);
        assert_eq!(output.len(), 4);
        assert_eq!(output[0], 0.0);
        assert!((output[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn empty_input_stays_empty() {
        assert!(resample(&[], 44100, 16000).is_empty());
    }
}
