//! Building blocks shared by the forecasting architectures.

pub mod attention;
pub mod embedding;
pub mod encoder;
pub mod normalization;
pub mod scaler;
pub mod smoothing;
pub mod stad;

pub use attention::{
    AttentionLayer, AttentionLayerConfig, FullAttention, FullAttentionConfig, TriangularCausalMask,
};
pub use embedding::{
    positional_encoding, DataEmbedding, DataEmbeddingInverted, DiffEmbedding, EwmaEmbedding,
    TimeFeatureEmbedding,
};
pub use encoder::{
    AttentionEncoder, AttentionEncoderLayer, EncoderConfig, StadEncoder, StadEncoderLayer,
};
pub use normalization::{instance_normalize, InstanceNormStats};
pub use scaler::{ScalerStats, ScalerType};
pub use stad::Stad;
