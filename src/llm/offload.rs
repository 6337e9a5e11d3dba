//! GPU layer offload arithmetic.
//!
//! `n_gpu_layers` follows the llama.cpp convention: a count of transformer
//! blocks to place in GPU memory, with -1 meaning all of them. llama.cpp
//! counts the output layer as one extra offloadable layer.

/// Converts the configured count into the value llama.cpp expects.
///
/// Any negative count means "everything"; llama.cpp clamps to the real layer count.
pub fn gpu_layers_param(n_gpu_layers: i32) -> u32 {
    u32::try_from(n_gpu_layers).unwrap_or(u32::MAX)
}

/// Returns `(offloaded, total)` layers for a model with `block_count` blocks.
pub fn offloaded_layers(n_gpu_layers: i32, block_count: u64) -> (u64, u64) {
    let total = block_count + 1;
    let offloaded = match u64::try_from(n_gpu_layers) {
        Ok(requested) => requested.min(total),
        Err(_) => total,
    };
    (offloaded, total)
}

/// Whether the model should be split by layer across several GPUs.
///
/// The llama_cpp bindings accept a split mode but not per-device ratios, so a
/// configured tensor split only selects layer splitting; llama.cpp then
/// distributes layers by free memory.
pub fn split_across_gpus(tensor_split: &[f32]) -> bool {
    !tensor_split.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_layers() {
        assert_eq!(gpu_layers_param(-1), u32::MAX);
        assert_eq!(offloaded_layers(-1, 80), (81, 81));
    }

    #[test]
    fn test_partial_offload() {
        assert_eq!(gpu_layers_param(40), 40);
        assert_eq!(offloaded_layers(40, 80), (40, 81));
        assert_eq!(offloaded_layers(0, 80), (0, 81));
    }

    #[test]
    fn test_request_beyond_model_is_clamped() {
        assert_eq!(offloaded_layers(200, 32), (33, 33));
    }

    #[test]
    fn test_tensor_split_selects_layer_split() {
        assert!(!split_across_gpus(&[]));
        assert!(split_across_gpus(&[0.5, 0.5]));
        assert!(split_across_gpus(&[3.0, 1.0]));
    }
}
