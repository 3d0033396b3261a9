pub mod ffmpeg;
pub mod frame;
pub mod normalizer;
pub mod sampler;

pub use ffmpeg::{FfmpegSource, VideoInfo};
pub use frame::{FrameSequence, NormalizedFrame, PixelLayout, RawFrame};
pub use normalizer::{FrameNormalizer, IMAGENET_MEAN, IMAGENET_STD, IMAGE_SIZE};
pub use sampler::{sample_frames, sample_video, FrameSource, SamplingConfig};
