// Detail synthesis and fee arithmetic. The scheduler reports segment
// boundaries; everything priced happens here, off the scheduling hot path.
use crate::clock::Clock;
use crate::scheduler::{DetailSink, SegmentEvent, ServiceEntry};
use crate::stores::{ConfigStore, DetailStore, StoreError};
use chrono::DateTime;
use shared_model::{Detail, FanSpeed, RoomId, Tariffs, Timestamp};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fees {
    /// Cost since the last power-on.
    pub current: f64,
    /// Cost since check-in.
    pub total: f64,
}

pub struct BillingRecorder {
    clock: Arc<dyn Clock>,
    details: Arc<dyn DetailStore>,
    config_store: Arc<dyn ConfigStore>,
    /// Wall seconds → billing minutes factor.
    time_scale: f64,
}

impl BillingRecorder {
    pub fn new(
        clock: Arc<dyn Clock>,
        details: Arc<dyn DetailStore>,
        config_store: Arc<dyn ConfigStore>,
        time_scale: f64,
    ) -> Self {
        Self { clock, details, config_store, time_scale }
    }

    fn scaled_minutes(&self, seconds: f64) -> f64 {
        seconds * self.time_scale / 60.0
    }

    fn tariffs(&self) -> Tariffs {
        match self.config_store.rates() {
            Ok(rates) => rates,
            Err(e) => {
                // a missing tariff table must never lose the usage record;
                // bill the segment at zero and flag it
                error!(error = %e, "tariff read failed, billing at zero");
                Tariffs { low: 0.0, medium: 0.0, high: 0.0 }
            }
        }
    }

    fn segment_cost(&self, speed: FanSpeed, start: Timestamp, end: Timestamp) -> (f64, f64) {
        let rate = self.tariffs().rate_for(speed);
        let seconds = (end - start).num_milliseconds() as f64 / 1000.0;
        (rate, rate * self.scaled_minutes(seconds))
    }

    fn synthesize(&self, ev: &SegmentEvent) -> Detail {
        let (rate, cost) = self.segment_cost(ev.speed, ev.segment_start, ev.segment_end);
        Detail {
            id: Uuid::new_v4(),
            room_id: ev.room_id,
            kind: ev.kind,
            query_time: self.clock.now(),
            segment_start: ev.segment_start,
            segment_end: ev.segment_end,
            serve_seconds: (ev.segment_end - ev.segment_start).num_seconds(),
            speed: ev.speed,
            rate,
            temp_change: ev.current_temp - ev.start_temp,
            current_temp: ev.current_temp,
            target_temp: ev.target_temp,
            cost,
        }
    }

    /// Price an in-flight segment as if it closed right now.
    fn open_segment_cost(&self, open: &ServiceEntry, now: Timestamp) -> f64 {
        self.segment_cost(open.speed, open.segment_start, now).1
    }

    /// Session and lifetime fees, replaying the detail log and including any
    /// open segment.
    pub fn fees(
        &self,
        room: RoomId,
        power_on_time: Option<Timestamp>,
        open: Option<&ServiceEntry>,
        now: Timestamp,
    ) -> Result<Fees, StoreError> {
        let all = self.details.by_room_window(room, DateTime::UNIX_EPOCH, now)?;
        let total: f64 = all.iter().map(|d| d.cost).sum();
        let current = match power_on_time {
            Some(from) => all
                .iter()
                .filter(|d| d.query_time >= from)
                .map(|d| d.cost)
                .sum(),
            None => 0.0,
        };
        let open_cost = open.map(|e| self.open_segment_cost(e, now)).unwrap_or(0.0);
        Ok(Fees { current: current + open_cost, total: total + open_cost })
    }
}

impl DetailSink for BillingRecorder {
    fn record(&self, event: SegmentEvent) {
        let detail = self.synthesize(&event);
        // transient store failure: log with room context, never roll back the
        // queue transition that produced the event
        if let Err(e) = self.details.append(detail) {
            error!(room = event.room_id, kind = ?event.kind, error = %e, "detail append failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::stores::{MemoryConfigStore, MemoryDetailStore};
    use shared_model::DetailKind;

    fn recorder(time_scale: f64) -> (BillingRecorder, ManualClock, Arc<MemoryDetailStore>) {
        let clock = ManualClock::epoch();
        let details = Arc::new(MemoryDetailStore::new());
        let rec = BillingRecorder::new(
            Arc::new(clock.clone()),
            details.clone(),
            Arc::new(MemoryConfigStore::new()),
            time_scale,
        );
        (rec, clock, details)
    }

    fn event(room: RoomId, speed: FanSpeed, start: Timestamp, end: Timestamp) -> SegmentEvent {
        SegmentEvent {
            room_id: room,
            kind: DetailKind::ServiceInterrupt,
            speed,
            segment_start: start,
            segment_end: end,
            start_temp: 28.0,
            current_temp: 26.0,
            target_temp: 24.0,
        }
    }

    #[test]
    fn closed_segment_is_priced_at_scaled_minutes() {
        let (rec, clock, details) = recorder(6.0);
        let t0 = clock.now();
        clock.advance_secs(60);
        rec.record(event(1, FanSpeed::Medium, t0, clock.now()));

        let rows = details.dump();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.serve_seconds, 60);
        assert_eq!(row.rate, 1.0);
        // 60 s × scale 6 = 360 billing seconds = 6 minutes at rate 1.0
        assert!((row.cost - 6.0).abs() < 1e-9);
        assert!((row.temp_change - (-2.0)).abs() < 1e-9);
    }

    #[test]
    fn markers_cost_nothing() {
        let (rec, clock, details) = recorder(6.0);
        let now = clock.now();
        rec.record(SegmentEvent::marker(1, DetailKind::PowerOn, FanSpeed::None, now, 28.0, 24.0));
        rec.record(SegmentEvent::marker(1, DetailKind::ServiceStart, FanSpeed::High, now, 28.0, 24.0));

        for row in details.dump() {
            assert_eq!(row.serve_seconds, 0);
            assert_eq!(row.cost, 0.0);
        }
    }

    #[test]
    fn fees_split_session_from_lifetime() {
        let (rec, clock, details) = recorder(1.0);
        let t0 = clock.now();

        // first session: 120 s of low (rate 0.5) = 1 currency at scale 1
        clock.advance_secs(120);
        rec.record(event(1, FanSpeed::Low, t0, clock.now()));

        // power cycle; second session starts here
        clock.advance_secs(10);
        let second_on = clock.now();
        let t1 = clock.now();
        clock.advance_secs(60);
        rec.record(event(1, FanSpeed::Medium, t1, clock.now()));

        let fees = rec
            .fees(1, Some(second_on), None, clock.now())
            .expect("fees");
        assert!((fees.current - 1.0).abs() < 1e-9);
        assert!((fees.total - 2.0).abs() < 1e-9);
        assert!(details.dump().len() == 2);
    }

    #[test]
    fn open_segment_counts_toward_both_fees() {
        let (rec, clock, _) = recorder(1.0);
        let t0 = clock.now();
        clock.advance_secs(60);

        let open = ServiceEntry {
            room_id: 1,
            speed: FanSpeed::High,
            target_temp: 24.0,
            current_temp: 26.0,
            segment_start: t0,
            segment_start_temp: 28.0,
            power_on_time: t0,
            duration: 60.0,
        };
        let fees = rec.fees(1, Some(t0), Some(&open), clock.now()).expect("fees");
        // 60 s of high at rate 2.0, scale 1 = 2 currency
        assert!((fees.current - 2.0).abs() < 1e-9);
        assert_eq!(fees.current, fees.total);
    }

    #[test]
    fn fees_are_monotone_in_time() {
        let (rec, clock, _) = recorder(6.0);
        let t0 = clock.now();
        let open = ServiceEntry {
            room_id: 1,
            speed: FanSpeed::Medium,
            target_temp: 24.0,
            current_temp: 27.0,
            segment_start: t0,
            segment_start_temp: 28.0,
            power_on_time: t0,
            duration: 0.0,
        };
        let mut last = 0.0;
        for _ in 0..10 {
            clock.advance_secs(7);
            let fees = rec.fees(1, Some(t0), Some(&open), clock.now()).expect("fees");
            assert!(fees.total >= last);
            last = fees.total;
        }
    }
}
