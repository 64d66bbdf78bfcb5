mod process_audio;

pub use process_audio::{
    apply_transform, Delivery, PipelineSettings, ProcessAudioUseCase, ProcessAudioUseCaseImpl,
};
