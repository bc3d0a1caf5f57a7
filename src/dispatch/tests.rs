//! Tests for the inbound dispatcher

use super::*;
use crate::state::LoopState;
use std::thread;

fn update(index: usize, control: &str, args: Vec<Arg>) -> Message {
    Message::new(format!("/sl/{}/update_{}", index, control), args)
}

fn reply(index: i32, control: &str, value: f32) -> Vec<Arg> {
    vec![Arg::Int(index), Arg::Str(control.to_string()), Arg::Float(value)]
}

fn store_with(count: usize) -> ChannelStore {
    let store = ChannelStore::new();
    store.set_channel_count(count);
    store
}

#[test]
fn test_update_wet_sets_only_that_channel() {
    let store = store_with(3);
    let msg = update(1, "wet", reply(1, "wet", 0.42));

    assert_eq!(dispatch(&store, &msg), Applied::Updated);

    let snap = store.snapshot();
    assert_eq!(snap.loops[1].gain, 0.42);
    assert_eq!(snap.loops[0], LoopState::default());
    assert_eq!(snap.loops[2], LoopState::default());
    assert_eq!(snap.loops[1].state, 0);
    assert_eq!(snap.loops[1].loop_pos, 0.0);
}

#[test]
fn test_update_wet_is_idempotent() {
    let store = store_with(2);
    let msg = update(0, "wet", reply(0, "wet", 0.3));

    dispatch(&store, &msg);
    let first = store.snapshot();
    dispatch(&store, &msg);
    assert_eq!(store.snapshot(), first);
}

#[test]
fn test_update_state_index_mismatch_is_noop() {
    let store = store_with(2);
    let msg = update(0, "state", reply(1, "state", 4.0));

    assert_eq!(classify(&msg), Inbound::Ignored);
    assert_eq!(dispatch(&store, &msg), Applied::Skipped);
    assert_eq!(store.get_or_create(0).state, 0);
    assert_eq!(store.get_or_create(1).state, 0);
}

#[test]
fn test_update_control_name_mismatch_is_noop() {
    let store = store_with(1);
    let msg = update(0, "state", reply(0, "next_state", 4.0));
    assert_eq!(classify(&msg), Inbound::Ignored);
    dispatch(&store, &msg);
    assert_eq!(store.get_or_create(0), LoopState::default());
}

#[test]
fn test_every_control_lands_in_its_field() {
    let store = store_with(1);
    for (name, value) in [
        ("state", 2.0),
        ("next_state", 4.0),
        ("loop_pos", 0.5),
        ("in_peak_meter", 0.25),
        ("out_peak_meter", 0.75),
        ("wet", 0.9),
    ] {
        dispatch(&store, &update(0, name, reply(0, name, value)));
    }

    let ls = store.get_or_create(0);
    assert_eq!(
        ls,
        LoopState {
            state: 2,
            next_state: 4,
            loop_pos: 0.5,
            in_peak: 0.25,
            out_peak: 0.75,
            gain: 0.9,
        }
    );
}

#[test]
fn test_state_value_truncates_to_code() {
    let store = store_with(1);
    dispatch(&store, &update(0, "state", reply(0, "state", 10.0)));
    dispatch(&store, &update(0, "next_state", reply(0, "next_state", -1.0)));
    let ls = store.get_or_create(0);
    assert_eq!(ls.state, 10);
    assert_eq!(ls.next_state, -1);
}

#[test]
fn test_update_integer_value_is_converted() {
    let msg = update(0, "state", vec![Arg::Int(0), "state".into(), Arg::Int(3)]);
    assert_eq!(
        classify(&msg),
        Inbound::Control { index: 0, control: Control::State, value: 3.0 }
    );
}

#[test]
fn test_update_with_bad_arity_is_malformed() {
    let short = update(0, "wet", vec![Arg::Int(0), "wet".into()]);
    assert!(matches!(classify(&short), Inbound::Malformed(_)));

    let long = update(0, "wet", vec![Arg::Int(0), "wet".into(), Arg::Float(0.1), Arg::Float(0.2)]);
    assert!(matches!(classify(&long), Inbound::Malformed(_)));

    let text_value = update(0, "wet", vec![Arg::Int(0), "wet".into(), "loud".into()]);
    assert!(matches!(classify(&text_value), Inbound::Malformed(_)));

    let store = store_with(1);
    assert_eq!(dispatch(&store, &short), Applied::Skipped);
    assert_eq!(store.get_or_create(0), LoopState::default());
}

#[test]
fn test_update_without_numeric_loop_segment_is_malformed() {
    let msg = Message::new("/sl/abc/update_wet", reply(0, "wet", 0.5));
    assert!(matches!(classify(&msg), Inbound::Malformed(_)));
}

#[test]
fn test_out_of_range_index_is_dropped() {
    let store = store_with(1);
    let msg = update(3, "wet", reply(3, "wet", 0.5));

    assert_eq!(dispatch(&store, &msg), Applied::OutOfRange);
    assert!(store.with_lock(|t| t.get(3).is_none()));
}

#[test]
fn test_pong_sets_channel_count() {
    let store = ChannelStore::new();
    let msg = Message::new(
        PONG,
        vec!["osc.udp://host:9951".into(), "1.7.4".into(), Arg::Int(4)],
    );

    assert_eq!(dispatch(&store, &msg), Applied::ChannelCount(4));
    assert_eq!(store.channel_count(), 4);
}

#[test]
fn test_pong_with_two_args_leaves_count() {
    let store = ChannelStore::new();
    let msg = Message::new(PONG, vec!["osc.udp://host:9951".into(), "1.7.4".into()]);

    assert_eq!(dispatch(&store, &msg), Applied::Skipped);
    assert_eq!(store.channel_count(), 1);
}

#[test]
fn test_pong_with_mistyped_count_leaves_count() {
    let store = ChannelStore::new();
    let float_count = Message::new(PONG, vec!["a".into(), "b".into(), Arg::Float(4.0)]);
    let negative = Message::new(PONG, vec!["a".into(), "b".into(), Arg::Int(-2)]);

    dispatch(&store, &float_count);
    dispatch(&store, &negative);
    assert_eq!(store.channel_count(), 1);
}

#[test]
fn test_oversized_pong_leaves_count() {
    let store = store_with(3);
    for n in [i32::MAX, MAX_LOOPS as i32 + 1] {
        let msg = Message::new(PONG, vec!["a".into(), "b".into(), Arg::Int(n)]);
        assert!(matches!(classify(&msg), Inbound::Malformed(_)));
        assert_eq!(dispatch(&store, &msg), Applied::Skipped);
    }
    assert_eq!(store.channel_count(), 3);

    let at_limit = Message::new(PONG, vec!["a".into(), "b".into(), Arg::Int(MAX_LOOPS as i32)]);
    assert_eq!(dispatch(&store, &at_limit), Applied::ChannelCount(MAX_LOOPS));
    assert_eq!(store.snapshot().loops.len(), MAX_LOOPS);
}

#[test]
fn test_pong_extra_args_are_ignored() {
    let msg = Message::new(PONG, vec!["a".into(), "b".into(), Arg::Int(2), Arg::Int(99)]);
    assert_eq!(classify(&msg), Inbound::ChannelCount(2));
}

#[test]
fn test_gain_message_sets_gain() {
    let store = store_with(2);
    let msg = Message::new("/strip/Sooper2/Gain/Gain (dB)", vec![Arg::Float(0.6)]);

    assert_eq!(classify(&msg), Inbound::Gain { index: 1, value: 0.6 });
    assert_eq!(dispatch(&store, &msg), Applied::Updated);
    assert_eq!(store.get_or_create(1).gain, 0.6);
    assert_eq!(store.get_or_create(0).gain, 0.0);
}

#[test]
fn test_gain_message_validation() {
    let no_args = Message::new("/strip/Sooper1/Gain/Gain (dB)", vec![]);
    let two = Message::new("/strip/Sooper1/Gain/Gain (dB)", vec![Arg::Float(0.1), Arg::Float(0.2)]);
    let int = Message::new("/strip/Sooper1/Gain/Gain (dB)", vec![Arg::Int(1)]);
    let bad_id = Message::new("/strip/SooperA/Gain/Gain (dB)", vec![Arg::Float(0.1)]);

    for msg in [&no_args, &two, &int, &bad_id] {
        assert!(matches!(classify(msg), Inbound::Malformed(_)), "{}", msg);
    }

    let store = store_with(1);
    for msg in [&no_args, &two, &int, &bad_id] {
        assert_eq!(dispatch(&store, msg), Applied::Skipped);
    }
    assert_eq!(store.get_or_create(0).gain, 0.0);
}

#[test]
fn test_gain_out_of_range_is_dropped() {
    let store = store_with(1);
    let msg = Message::new("/strip/Sooper5/Gain/Gain (dB)", vec![Arg::Float(0.6)]);
    assert_eq!(dispatch(&store, &msg), Applied::OutOfRange);
}

#[test]
fn test_unknown_addresses_are_ignored() {
    for addr in ["/sl/0/update_rate", "/status", "/ping", "/sl/0/get"] {
        let msg = Message::new(addr, vec![Arg::Int(0)]);
        assert_eq!(classify(&msg), Inbound::Ignored, "{}", addr);
    }
}

#[test]
fn test_late_pong_shrinks_range() {
    let store = store_with(4);
    dispatch(&store, &update(3, "wet", reply(3, "wet", 0.2)));
    dispatch(&store, &Message::new(PONG, vec!["a".into(), "b".into(), Arg::Int(2)]));

    assert_eq!(
        dispatch(&store, &update(3, "wet", reply(3, "wet", 0.8))),
        Applied::OutOfRange
    );
    assert_eq!(store.with_lock(|t| t.get(3).map(|l| l.gain)), Some(0.2));
}

#[test]
fn test_concurrent_dispatch_and_snapshots() {
    let store = store_with(2);
    let wet_values: Vec<f32> = (0..200).map(|k| k as f32 / 200.0).collect();

    let writers: Vec<_> = (0..2usize)
        .map(|channel| {
            let store = store.clone();
            let values = wet_values.clone();
            thread::spawn(move || {
                for v in values {
                    let i = channel as i32;
                    dispatch(&store, &update(channel, "wet", reply(i, "wet", v)));
                    dispatch(&store, &update(channel, "loop_pos", reply(i, "loop_pos", v)));
                }
            })
        })
        .collect();

    let reader = {
        let store = store.clone();
        let values = wet_values.clone();
        thread::spawn(move || {
            for _ in 0..400 {
                let snap = store.snapshot();
                assert_eq!(snap.loops.len(), 2);
                for ls in &snap.loops {
                    assert!(ls.gain == 0.0 || values.contains(&ls.gain));
                    assert!(ls.loop_pos == 0.0 || values.contains(&ls.loop_pos));
                    assert_eq!(ls.state, 0);
                    assert_eq!(ls.in_peak, 0.0);
                }
            }
        })
    };

    for h in writers {
        h.join().unwrap();
    }
    reader.join().unwrap();

    let snap = store.snapshot();
    assert_eq!(snap.loops[0].gain, 199.0 / 200.0);
    assert_eq!(snap.loops[1].loop_pos, 199.0 / 200.0);
}
