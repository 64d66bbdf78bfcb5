use validator::Validate;

use voice_domain::StoredAudio;

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Validate)]
pub struct ProcessAudioRequest {
    pub file: Option<UploadedFile>,
    #[validate(length(max = 64))]
    pub option: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StreamedAudio {
    pub bytes: Vec<u8>,
    pub media_type: &'static str,
    pub file_name: String,
}

#[derive(Debug, Clone)]
pub enum ProcessAudioResponse {
    Stream(StreamedAudio),
    Stored(StoredAudio),
}
