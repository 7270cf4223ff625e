use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use framecast_frame::{Frame, FrameAccumulator, LineDecoder, DEFAULT_MAX_LINE};

use crate::broadcaster::ChannelBroadcaster;
use crate::config::{ChannelConfig, Encoding, SubscriberConfig};
use crate::error::Result;

/// Decoder chain turning producer bytes into frames.
#[derive(Debug)]
enum Pipeline {
    Fixed(FrameAccumulator),
    Lines {
        decoder: LineDecoder,
        /// `None` forwards each decoded line as its own frame.
        accumulator: Option<FrameAccumulator>,
    },
}

impl Pipeline {
    fn from_config(config: &ChannelConfig) -> Result<Self> {
        match config.encoding {
            Encoding::Raw => {
                let mut accumulator = FrameAccumulator::new(config.frame_size)?;
                if let Some(trailer) = &config.trailer {
                    accumulator =
                        accumulator.with_trailer(Bytes::from(trailer.clone().into_bytes()));
                }
                Ok(Pipeline::Fixed(accumulator))
            }
            Encoding::Base64Lines => {
                let decoder = LineDecoder::with_delimiter(
                    Bytes::from(config.delimiter.clone().into_bytes()),
                    DEFAULT_MAX_LINE,
                )?;
                let accumulator = match config.frame_size {
                    0 => None,
                    size => Some(FrameAccumulator::new(size)?),
                };
                Ok(Pipeline::Lines {
                    decoder,
                    accumulator,
                })
            }
        }
    }

    fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        match self {
            Pipeline::Fixed(accumulator) => accumulator.feed(chunk),
            Pipeline::Lines {
                decoder,
                accumulator: None,
            } => decoder.feed(chunk).into_iter().map(Frame::binary).collect(),
            Pipeline::Lines {
                decoder,
                accumulator: Some(accumulator),
            } => decoder
                .feed(chunk)
                .iter()
                .flat_map(|line| accumulator.feed(line))
                .collect(),
        }
    }

    fn buffered(&self) -> usize {
        match self {
            Pipeline::Fixed(accumulator) => accumulator.buffered(),
            Pipeline::Lines {
                decoder,
                accumulator,
            } => decoder.buffered() + accumulator.as_ref().map_or(0, FrameAccumulator::buffered),
        }
    }
}

/// Counters reported by [`Channel::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub frames: u64,
    pub buffered: usize,
    pub producers: usize,
    pub subscribers: usize,
}

/// One logical data flow: a decoder chain feeding a subscriber set.
///
/// Producer connections on the same channel share the decoder chain, so their
/// bytes merge into one stream.
#[derive(Debug)]
pub struct Channel {
    config: ChannelConfig,
    pipeline: Mutex<Pipeline>,
    broadcaster: ChannelBroadcaster,
    frames: AtomicU64,
    producers: AtomicUsize,
}

impl Channel {
    pub fn new(config: &ChannelConfig, subscriber: &SubscriberConfig) -> Result<Self> {
        Ok(Self {
            pipeline: Mutex::new(Pipeline::from_config(config)?),
            broadcaster: ChannelBroadcaster::new(config.name.clone(), subscriber.queue_depth),
            config: config.clone(),
            frames: AtomicU64::new(0),
            producers: AtomicUsize::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn broadcaster(&self) -> &ChannelBroadcaster {
        &self.broadcaster
    }

    /// Feed producer bytes and fan out every frame they complete.
    ///
    /// Returns the number of frames emitted. All frames completed by one chunk
    /// go out as a single batch, and they are broadcast while the pipeline is
    /// still locked so concurrent producers cannot reorder them.
    pub fn ingest(&self, chunk: &[u8]) -> usize {
        let mut pipeline = self.lock_pipeline();
        let frames = pipeline.feed(chunk);
        let count = frames.len();
        if count == 0 {
            return 0;
        }

        let bytes: usize = frames.iter().map(Frame::len).sum();
        let report = self.broadcaster.broadcast_batch(frames);
        tracing::trace!(
            channel = %self.config.name,
            frames = count,
            bytes,
            delivered = report.delivered,
            dropped = report.dropped,
            "frames broadcast"
        );
        self.frames.fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    /// Bytes waiting for the next frame boundary.
    pub fn buffered(&self) -> usize {
        self.lock_pipeline().buffered()
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            frames: self.frames.load(Ordering::Relaxed),
            buffered: self.buffered(),
            producers: self.producers.load(Ordering::Relaxed),
            subscribers: self.broadcaster.subscriber_count(),
        }
    }

    /// Record a producer connection; returns how many are now active.
    pub(crate) fn producer_connected(&self) -> usize {
        self.producers.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record a producer disconnect; returns how many remain.
    pub(crate) fn producer_disconnected(&self) -> usize {
        self.producers.fetch_sub(1, Ordering::Relaxed).saturating_sub(1)
    }

    fn lock_pipeline(&self) -> MutexGuard<'_, Pipeline> {
        self.pipeline.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;

    use super::*;
    use crate::error::BridgeError;

    fn channel(config: ChannelConfig) -> Channel {
        Channel::new(&config, &SubscriberConfig::default()).unwrap()
    }

    #[test]
    fn raw_channel_fans_out_fixed_frames() {
        let ch = channel(ChannelConfig::raw("depth", 0, 0, 4));
        let mut sub = ch.broadcaster().subscribe();

        assert_eq!(ch.ingest(b"abcdef"), 1);
        assert_eq!(ch.buffered(), 2);
        assert_eq!(sub.try_recv().unwrap().payload.as_ref(), b"abcd");

        assert_eq!(ch.ingest(b"gh"), 1);
        assert_eq!(sub.try_recv().unwrap().payload.as_ref(), b"efgh");
        assert_eq!(ch.stats().frames, 2);
    }

    #[test]
    fn raw_channel_applies_trailer() {
        let ch = channel(ChannelConfig::raw("rgb", 0, 0, 3).with_trailer("\n"));
        let mut sub = ch.broadcaster().subscribe();

        assert_eq!(ch.ingest(b"abc\ndef\n"), 2);
        assert_eq!(sub.try_recv().unwrap().payload.as_ref(), b"abc");
        assert_eq!(sub.try_recv().unwrap().payload.as_ref(), b"def");
    }

    #[test]
    fn line_channel_emits_one_frame_per_line() {
        let ch = channel(ChannelConfig::base64_lines("imu", 0, 0, 0));
        let mut sub = ch.broadcaster().subscribe();

        let wire = format!(
            "{}\nnot*base64\n{}\n",
            BASE64.encode("w x y z"),
            BASE64.encode("1 2 3 4")
        );
        assert_eq!(ch.ingest(wire.as_bytes()), 2);
        assert_eq!(sub.try_recv().unwrap().payload.as_ref(), b"w x y z");
        assert_eq!(sub.try_recv().unwrap().payload.as_ref(), b"1 2 3 4");
    }

    #[test]
    fn line_channel_can_accumulate_fixed_frames() {
        let ch = channel(ChannelConfig::base64_lines("rgb", 0, 0, 6));
        let mut sub = ch.broadcaster().subscribe();

        let wire = format!("{}\n{}\n", BASE64.encode("abcd"), BASE64.encode("efghij"));
        assert_eq!(ch.ingest(wire.as_bytes()), 1);
        assert_eq!(sub.try_recv().unwrap().payload.as_ref(), b"abcdef");
        assert_eq!(ch.buffered(), 4);
    }

    #[test]
    fn burst_of_lines_does_not_overflow_subscriber_queue() {
        let ch = channel(ChannelConfig::base64_lines("imu", 0, 0, 0));
        let mut sub = ch.broadcaster().subscribe();

        let wire: String = (0..10)
            .map(|i| format!("{}\n", BASE64.encode(format!("sample {i}"))))
            .collect();
        assert_eq!(ch.ingest(wire.as_bytes()), 10);
        assert_eq!(ch.broadcaster().subscriber_count(), 1);
        for i in 0..10 {
            let frame = sub.try_recv().unwrap();
            assert_eq!(frame.payload.as_ref(), format!("sample {i}").as_bytes());
        }
    }

    #[test]
    fn raw_channel_rejects_zero_frame_size() {
        let err = Channel::new(&ChannelConfig::raw("rgb", 0, 0, 0), &SubscriberConfig::default())
            .unwrap_err();
        assert!(matches!(err, BridgeError::Frame(_)));
    }

    #[test]
    fn producer_counts_track_connections() {
        let ch = channel(ChannelConfig::raw("rgb", 0, 0, 4));
        assert_eq!(ch.producer_connected(), 1);
        assert_eq!(ch.producer_connected(), 2);
        assert_eq!(ch.producer_disconnected(), 1);
        assert_eq!(ch.stats().producers, 1);
    }
}
