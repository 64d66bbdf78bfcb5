pub mod dto;
pub mod error;
pub mod option;
pub mod usecase;

pub use dto::*;
pub use error::*;
pub use option::{OptionResolver, OptionTable};
pub use usecase::{Delivery, PipelineSettings, ProcessAudioUseCase, ProcessAudioUseCaseImpl};
