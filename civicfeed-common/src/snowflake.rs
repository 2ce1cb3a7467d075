//! Snowflake ids.
//!
//! A snowflake packs, from the most significant bit down, 42 bits of
//! milliseconds since an [`Epoch`], a 5 bit worker id, a 5 bit process id and a
//! 12 bit increment that the [`SnowflakeGenerator`] bumps for every id it hands
//! out. Ids generated later therefore sort after ids generated earlier.

use derive_where::derive_where;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    marker::PhantomData,
};
use thiserror::Error;
use time::{Duration, OffsetDateTime};

pub const TIMESTAMP_OFFSET: u32 = 22;
pub const TIMESTAMP_LENGTH: u32 = 42;
pub const WORKER_ID_OFFSET: u32 = 17;
pub const PROCESS_ID_OFFSET: u32 = 12;
pub const NODE_ID_LENGTH: u32 = 5;
pub const INCREMENT_OFFSET: u32 = 0;
pub const INCREMENT_LENGTH: u32 = 12;

const fn mask(length: u32) -> u64 {
    (1 << length) - 1
}

pub trait Epoch {
    const EPOCH_TIME: OffsetDateTime;
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Error)]
pub enum SnowflakeError {
    #[error("{0} lies before the snowflake epoch")]
    TimeBeforeEpoch(OffsetDateTime),
    #[error("{0} is too far after the snowflake epoch")]
    TimestampTooLarge(OffsetDateTime),
    #[error("Node id {0} does not fit into {NODE_ID_LENGTH} bits")]
    NodeIdOutOfRange(u8),
}

/// Worker or process part of a snowflake.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
pub struct NodeId(u8);

impl NodeId {
    pub fn new(id: u8) -> Result<Self, SnowflakeError> {
        if u64::from(id) <= mask(NODE_ID_LENGTH) {
            Ok(Self(id))
        } else {
            Err(SnowflakeError::NodeIdOutOfRange(id))
        }
    }

    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let inner = u8::deserialize(deserializer)?;
        Self::new(inner).map_err(serde::de::Error::custom)
    }
}

#[derive_where(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Debug,
    Default,
    Hash,
    Serialize,
    Deserialize
)]
#[serde(transparent)]
pub struct Snowflake<SnowflakeEpoch>(u64, #[serde(skip)] PhantomData<SnowflakeEpoch>);

impl<SnowflakeEpoch> Snowflake<SnowflakeEpoch> {
    #[must_use]
    pub fn new(inner: u64) -> Self {
        Self(inner, PhantomData)
    }

    #[must_use]
    pub fn from_parts(millis: u64, worker_id: NodeId, process_id: NodeId, increment: u16) -> Self {
        let snowflake = (millis & mask(TIMESTAMP_LENGTH)) << TIMESTAMP_OFFSET
            | u64::from(worker_id.get()) << WORKER_ID_OFFSET
            | u64::from(process_id.get()) << PROCESS_ID_OFFSET
            | (u64::from(increment) & mask(INCREMENT_LENGTH)) << INCREMENT_OFFSET;

        Self::new(snowflake)
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    /// Milliseconds since the epoch.
    #[must_use]
    pub fn millis(self) -> u64 {
        (self.0 >> TIMESTAMP_OFFSET) & mask(TIMESTAMP_LENGTH)
    }

    #[must_use]
    pub fn worker_id(self) -> NodeId {
        #[allow(clippy::cast_possible_truncation)]
        NodeId(((self.0 >> WORKER_ID_OFFSET) & mask(NODE_ID_LENGTH)) as u8)
    }

    #[must_use]
    pub fn process_id(self) -> NodeId {
        #[allow(clippy::cast_possible_truncation)]
        NodeId(((self.0 >> PROCESS_ID_OFFSET) & mask(NODE_ID_LENGTH)) as u8)
    }

    #[must_use]
    pub fn increment(self) -> u16 {
        #[allow(clippy::cast_possible_truncation)]
        let increment = ((self.0 >> INCREMENT_OFFSET) & mask(INCREMENT_LENGTH)) as u16;
        increment
    }

    #[must_use]
    pub fn created_at(self) -> OffsetDateTime
    where
        SnowflakeEpoch: Epoch,
    {
        SnowflakeEpoch::EPOCH_TIME + Duration::milliseconds(self.millis().cast_signed())
    }
}

impl<SnowflakeEpoch> Display for Snowflake<SnowflakeEpoch> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<SnowflakeEpoch> From<u64> for Snowflake<SnowflakeEpoch> {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl<SnowflakeEpoch> From<Snowflake<SnowflakeEpoch>> for u64 {
    fn from(value: Snowflake<SnowflakeEpoch>) -> Self {
        value.get()
    }
}

fn millis_since_epoch<SnowflakeEpoch: Epoch>(time: OffsetDateTime) -> Result<u64, SnowflakeError> {
    let millis = (time - SnowflakeEpoch::EPOCH_TIME).whole_milliseconds();
    let millis = u64::try_from(millis).map_err(|_| SnowflakeError::TimeBeforeEpoch(time))?;
    if millis > mask(TIMESTAMP_LENGTH) {
        return Err(SnowflakeError::TimestampTooLarge(time));
    }
    Ok(millis)
}

#[derive_where(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct SnowflakeGenerator<SnowflakeEpoch> {
    worker_id: NodeId,
    process_id: NodeId,
    next_increment: u16,
    phantom_data: PhantomData<SnowflakeEpoch>,
}

impl<SnowflakeEpoch: Epoch> SnowflakeGenerator<SnowflakeEpoch> {
    #[must_use]
    pub fn new(worker_id: NodeId, process_id: NodeId) -> Self {
        Self {
            worker_id,
            process_id,
            next_increment: 0,
            phantom_data: PhantomData,
        }
    }

    pub fn generate_at(
        &mut self,
        time: OffsetDateTime,
    ) -> Result<Snowflake<SnowflakeEpoch>, SnowflakeError> {
        let millis = millis_since_epoch::<SnowflakeEpoch>(time)?;

        let increment = self.next_increment;
        #[allow(clippy::cast_possible_truncation)]
        let wrap = mask(INCREMENT_LENGTH) as u16;
        self.next_increment = increment.wrapping_add(1) & wrap;

        Ok(Snowflake::from_parts(
            millis,
            self.worker_id,
            self.process_id,
            increment,
        ))
    }

    pub fn generate(&mut self) -> Result<Snowflake<SnowflakeEpoch>, SnowflakeError> {
        self.generate_at(OffsetDateTime::now_utc())
    }
}

#[cfg(test)]
mod tests {
    use crate::snowflake::{Epoch, NodeId, Snowflake, SnowflakeError, SnowflakeGenerator};
    use time::{Duration, OffsetDateTime, macros::datetime};

    struct MillennialEpoch;
    impl Epoch for MillennialEpoch {
        const EPOCH_TIME: OffsetDateTime = datetime!(2000-01-01 00:00 UTC);
    }

    #[test]
    fn node_ids_fit_five_bits() {
        for legal in [0, 0xD, 0x1F] {
            assert!(NodeId::new(legal).is_ok());
        }
        for illegal in [0x20, 0xF0, u8::MAX] {
            assert_eq!(
                NodeId::new(illegal),
                Err(SnowflakeError::NodeIdOutOfRange(illegal))
            );
        }
    }

    #[test]
    fn parts_survive_packing() {
        let worker_id = NodeId::new(0b10101).unwrap();
        let process_id = NodeId::new(0b10001).unwrap();
        let snowflake = Snowflake::<MillennialEpoch>::from_parts(123_456, worker_id, process_id, 100);

        assert_eq!(snowflake.millis(), 123_456);
        assert_eq!(snowflake.worker_id(), worker_id);
        assert_eq!(snowflake.process_id(), process_id);
        assert_eq!(snowflake.increment(), 100);
        assert_eq!(
            snowflake.created_at(),
            MillennialEpoch::EPOCH_TIME + Duration::milliseconds(123_456)
        );
    }

    #[test]
    fn generator_bumps_increment_and_wraps() {
        let mut generator =
            SnowflakeGenerator::<MillennialEpoch>::new(NodeId::new(10).unwrap(), NodeId::default());
        let time = datetime!(2025-10-24 10:55 UTC);

        let first = generator.generate_at(time).unwrap();
        let second = generator.generate_at(time).unwrap();
        assert_eq!(first.increment(), 0);
        assert_eq!(second.increment(), 1);
        assert!(first < second);

        for _ in 2..0x1000 {
            generator.generate_at(time).unwrap();
        }
        assert_eq!(generator.generate_at(time).unwrap().increment(), 0);
    }

    #[test]
    fn later_ids_sort_after_earlier_ids() {
        let mut generator = SnowflakeGenerator::<MillennialEpoch>::default();
        let earlier = generator.generate_at(datetime!(2025-10-24 10:55 UTC)).unwrap();
        let later = generator.generate_at(datetime!(2025-10-24 10:56 UTC)).unwrap();
        assert!(earlier < later);
    }

    #[test]
    fn rejects_times_outside_the_timestamp_range() {
        let mut generator = SnowflakeGenerator::<MillennialEpoch>::default();

        let before = MillennialEpoch::EPOCH_TIME - Duration::milliseconds(1);
        assert_eq!(
            generator.generate_at(before),
            Err(SnowflakeError::TimeBeforeEpoch(before))
        );

        let too_late = MillennialEpoch::EPOCH_TIME + Duration::milliseconds(0x0400_0000_0000);
        assert_eq!(
            generator.generate_at(too_late),
            Err(SnowflakeError::TimestampTooLarge(too_late))
        );
    }
}
