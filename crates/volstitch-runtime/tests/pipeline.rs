use burn::backend::NdArray;
use burn::prelude::Backend;
use burn::tensor::Tensor;
use ndarray::{Array4, Array5, s};
use rstest::rstest;
use volstitch_core::{
    CancelToken, ConfigError, InferenceConfig, ProducerError, ReconstructionError, RunOutcome,
};
use volstitch_runtime::logging::init_test_logger;
use volstitch_runtime::{
    BurnNetwork, MemoryRegistry, OutputMode, OutputStore, SegmentationModel, run_inference,
};

fn config(contents: &str) -> InferenceConfig {
    InferenceConfig::from_toml_str(contents).unwrap()
}

fn ramp(shape: (usize, usize, usize, usize)) -> Array4<f32> {
    Array4::from_shape_fn(shape, |(x, y, z, m)| (1 + x + 50 * y + 2500 * z + 7 * m) as f32)
}

fn identity(images: Array5<f32>) -> anyhow::Result<Array5<f32>> {
    Ok(images)
}

/// The stitched output of an identity network must reproduce the input image.
fn assert_reconstructs(store: &OutputStore, subject_id: i64, image: &Array4<f32>) {
    let saved = store.get(subject_id).unwrap();
    let volume = saved.volume.slice(s![.., .., .., 0, 0]);
    assert_eq!(volume, image.slice(s![.., .., .., 0]));
}

#[test]
fn test_volumetric_run_reconstructs_every_subject() {
    init_test_logger();
    let a = ramp((48, 24, 24, 1));
    let b = ramp((30, 26, 24, 1));
    let store = OutputStore::new();
    let registry = MemoryRegistry::new(store.clone())
        .with_subject("a", a.clone())
        .with_subject("b", b.clone());
    let config = config(
        "spatial_rank = 3\nimage_size = 32\nlabel_size = 32\nborder = 4\nbatch_size = 3\nqueue_length = 3\nsave_seg_dir = \"segs\"\n",
    );

    let report = run_inference(&config, registry, identity, CancelToken::new()).unwrap();

    assert!(matches!(report.outcome, RunOutcome::Completed));
    assert!(report.all_saved());
    assert_eq!(report.saved_subjects, vec![0, 1]);
    assert_eq!(report.patches, 2 + 4);
    assert_reconstructs(&store, 0, &a);
    assert_reconstructs(&store, 1, &b);
    let paths: Vec<_> = store.outputs().into_iter().map(|o| o.path).collect();
    assert_eq!(
        paths,
        vec![
            std::path::PathBuf::from("segs/a_seg.nii.gz"),
            std::path::PathBuf::from("segs/b_seg.nii.gz")
        ]
    );
}

#[test]
fn test_planar_shrinking_network() {
    let image = ramp((20, 18, 1, 1));
    let store = OutputStore::new();
    let registry = MemoryRegistry::new(store.clone()).with_subject("slice", image.clone());
    let config = config("spatial_rank = 2\nimage_size = 8\nlabel_size = 4\nbatch_size = 4\n");
    let crop = |images: Array5<f32>| -> anyhow::Result<Array5<f32>> {
        Ok(images.slice(s![.., 2..6, 2..6, .., ..]).to_owned())
    };

    let report = run_inference(&config, registry, crop, CancelToken::new()).unwrap();

    assert!(report.outcome.is_success());
    assert_eq!(report.saved_subjects, vec![0]);
    assert_reconstructs(&store, 0, &image);
}

#[test]
fn test_slice_stack_run() {
    let image = ramp((10, 10, 3, 1));
    let store = OutputStore::new();
    let registry = MemoryRegistry::new(store.clone()).with_subject("stack", image.clone());
    let config = config("spatial_rank = 2.5\nimage_size = 10\nlabel_size = 10\nbatch_size = 2\n");

    let report = run_inference(&config, registry, identity, CancelToken::new()).unwrap();

    assert!(report.outcome.is_success());
    assert_eq!(report.patches, 3);
    assert_reconstructs(&store, 0, &image);
}

/// Uses input modalities as class scores.
struct Passthrough;

impl<B: Backend> SegmentationModel<B> for Passthrough {
    fn forward(&self, images: Tensor<B, 5>) -> Tensor<B, 5> {
        images
    }
}

#[rstest]
#[case(false, [16, 16, 1, 1, 1])]
#[case(true, [16, 16, 1, 1, 2])]
fn test_burn_network_output_layout(#[case] output_prob: bool, #[case] expected: [usize; 5]) {
    let store = OutputStore::new();
    let registry = MemoryRegistry::new(store.clone()).with_subject("two", ramp((16, 16, 1, 2)));
    let mut config = config("spatial_rank = 2\nimage_size = 8\nlabel_size = 8\nnum_classes = 2\n");
    config.output_prob = output_prob;
    let network = BurnNetwork::<NdArray, _>::new(
        Passthrough,
        Default::default(),
        OutputMode::for_config(&config),
    );

    let report = run_inference(&config, registry, network, CancelToken::new()).unwrap();

    assert!(report.outcome.is_success());
    let saved = store.get(0).unwrap();
    assert_eq!(saved.volume.shape(), &expected);
    if !output_prob {
        // The second modality is always larger in the ramp.
        assert!(saved.volume.iter().all(|v| *v == 1.0));
    }
}

#[test]
fn test_network_failure_is_reported() {
    let store = OutputStore::new();
    let registry = MemoryRegistry::new(store.clone())
        .with_subject("a", ramp((8, 8, 1, 1)))
        .with_subject("b", ramp((8, 8, 1, 1)));
    let config = config("spatial_rank = 2\nimage_size = 8\nlabel_size = 8\n");
    let mut calls = 0;
    let flaky = move |images: Array5<f32>| -> anyhow::Result<Array5<f32>> {
        calls += 1;
        if calls > 1 {
            anyhow::bail!("device lost");
        }
        Ok(images)
    };

    let report = run_inference(&config, registry, flaky, CancelToken::new()).unwrap();

    assert!(matches!(
        report.outcome,
        RunOutcome::Failed(ReconstructionError::Producer(ProducerError::NetworkFailed(_)))
    ));
    assert!(!report.all_saved());
    assert!(store.is_empty());
}

#[test]
fn test_cancelled_run_saves_nothing() {
    let store = OutputStore::new();
    let registry = MemoryRegistry::new(store.clone()).with_subject("a", ramp((8, 8, 1, 1)));
    let config = config("spatial_rank = 2\nimage_size = 8\nlabel_size = 8\n");
    let cancel = CancelToken::new();
    cancel.cancel();

    let report = run_inference(&config, registry, identity, cancel).unwrap();

    assert!(matches!(report.outcome, RunOutcome::Cancelled));
    assert!(store.is_empty());
}

#[test]
fn test_subject_smaller_than_patch_fails() {
    let store = OutputStore::new();
    let registry = MemoryRegistry::new(store.clone()).with_subject("tiny", ramp((4, 4, 4, 1)));
    let config = config("spatial_rank = 3\nimage_size = 8\nlabel_size = 8\n");

    let report = run_inference(&config, registry, identity, CancelToken::new()).unwrap();

    assert!(matches!(
        report.outcome,
        RunOutcome::Failed(ReconstructionError::Producer(ProducerError::SamplingFailed(_)))
    ));
}

#[test]
fn test_empty_registry_completes() {
    let store = OutputStore::new();
    let registry = MemoryRegistry::new(store.clone());
    let config = config("spatial_rank = 3\nimage_size = 8\nlabel_size = 8\n");

    let report = run_inference(&config, registry, identity, CancelToken::new()).unwrap();

    assert!(matches!(report.outcome, RunOutcome::Completed));
    assert!(report.saved_subjects.is_empty());
}

#[test]
fn test_invalid_geometry_is_rejected_up_front() {
    let registry = MemoryRegistry::new(OutputStore::new());
    let mut config = config("spatial_rank = 3\nimage_size = 8\nlabel_size = 8\n");
    config.label_size = 5;

    let result = run_inference(&config, registry, identity, CancelToken::new());
    assert!(matches!(result, Err(ConfigError::NonIntegerOffset { .. })));
}
