pub mod candle;
pub mod timeframe;

pub use candle::*;
pub use timeframe::*;
