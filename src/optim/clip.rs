//! Gradient clipping utilities

use ndarray::Array2;

/// Clip gradients by global norm
///
/// global_norm = sqrt(sum of all squared entries); if it exceeds `max_norm`
/// every gradient is scaled by `max_norm / global_norm`.
///
/// Returns the global norm before clipping.
pub fn clip_grad_norm(grads: &mut [Array2<f32>], max_norm: f32) -> f32 {
    let total_norm_sq: f32 = grads.iter().flat_map(|g| g.iter()).map(|&g| g * g).sum();
    let global_norm = total_norm_sq.sqrt();

    if global_norm > max_norm {
        let clip_coef = max_norm / global_norm;
        for grad in grads.iter_mut() {
            grad.mapv_inplace(|g| g * clip_coef);
        }
    }
    global_norm
}
