//! End-to-end pulls through Mixer -> Bus -> EffectController -> Track, with
//! WAV fixtures written in memory and decoded through symphonia.

use std::io::Cursor;
use std::time::Duration;

use cadenza_engine::{
    shared, AudioFormat, AudioSource, Bus, BusEvent, EffectController, EffectDef, EffectKind,
    MemoryDecoder, Mixer, ParamF, SharedSource, SourceId, Timing, Track,
};

const SR: u32 = 8_000;

fn wav_bytes(channels: u16, frames: usize, sample: impl Fn(usize, u16) -> i16) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate: SR,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut w = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..frames {
            for ch in 0..channels {
                w.write_sample(sample(i, ch)).unwrap();
            }
        }
        w.finalize().unwrap();
    }
    cursor.into_inner()
}

fn wav_track(channels: u16, frames: usize, sample: impl Fn(usize, u16) -> i16) -> Track {
    let bytes = wav_bytes(channels, frames, sample);
    Track::from_stream("wav", Box::new(Cursor::new(bytes))).unwrap()
}

/// Left +0.5, right -0.5.
fn split_track(frames: usize) -> Track {
    wav_track(2, frames, |_, ch| if ch == 0 { 16_384 } else { -16_384 })
}

fn mixer() -> Mixer {
    Mixer::with_format(AudioFormat::stereo(SR)).unwrap()
}

#[test]
fn wav_plays_through_the_graph() {
    let mixer = mixer();
    let bus = mixer.add_channel("music").unwrap();
    let mut track = split_track(800);
    assert_eq!(track.length(), Some(800));
    track.play();
    Bus::add_source(&bus, shared(EffectController::new(4, track))).unwrap();

    let mut out = vec![0.0_f32; 2 * 256];
    assert_eq!(mixer.render(&mut out), 256);
    for lr in out.chunks_exact(2) {
        assert!((lr[0] - 0.5).abs() < 1e-3);
        assert!((lr[1] + 0.5).abs() < 1e-3);
    }
}

#[test]
fn mono_files_fill_both_channels() {
    let mut track = wav_track(1, 64, |_, _| 8_192);
    track.play();
    let mut out = vec![0.0_f32; 2 * 32];
    assert_eq!(track.read(&mut out).frames, 32);
    assert!(out.iter().all(|s| (*s - 0.25).abs() < 1e-3));
}

#[test]
fn finished_tracks_leave_the_bus_once() {
    let mixer = mixer();
    let bus = mixer.add_channel("sfx").unwrap();
    let events = bus.lock().events();
    let mut track = split_track(100);
    track.play();
    let ctl: SharedSource = shared(EffectController::new(1, track));
    let id = SourceId::of(&ctl);
    Bus::add_source(&bus, ctl.clone()).unwrap();

    let mut out = vec![0.0_f32; 2 * 64];
    for _ in 0..4 {
        mixer.render(&mut out);
    }
    assert!(bus.lock().is_empty());
    assert!(ctl.lock().core().channel().is_none());
    let got: Vec<BusEvent> = events.try_iter().collect();
    assert_eq!(got, vec![BusEvent::SourceFinished { bus: "sfx".into(), source: id }]);
    assert!(out.iter().all(|s| *s == 0.0));
}

#[test]
fn double_speed_halves_the_output() {
    let mut track = split_track(800);
    track.set_speed(2.0);
    track.play();
    let mut out = vec![0.0_f32; 2 * 128];
    let mut total = 0;
    loop {
        let outcome = track.read(&mut out);
        if outcome.is_finished() {
            break;
        }
        total += outcome.frames;
    }
    assert!((399..=400).contains(&total), "{total}");
}

#[test]
fn loop_area_repeats_decoded_audio() {
    // Ramp so the cursor is visible in the samples.
    let mut track = wav_track(2, 1_000, |i, _| i16::try_from(i * 16).unwrap());
    track.set_loop_area(100, 200).unwrap();
    track.seek(Duration::from_millis(15)).unwrap();
    track.play();
    let mut out = vec![0.0_f32; 2 * 500];
    assert_eq!(track.read(&mut out).frames, 500);
    for lr in out.chunks_exact(2) {
        let frame = (lr[0] * 32_768.0 / 16.0).round();
        assert!((100.0..200.0).contains(&frame), "{frame}");
    }
    assert!((100..200).contains(&track.cursor()));
}

#[test]
fn seek_is_exact_and_clamps() {
    let mut track = split_track(800);
    track.seek(Duration::from_millis(40)).unwrap();
    assert_eq!(track.position(), Duration::from_millis(40));
    track.play();
    assert_eq!(track.cursor(), 320);
    track.seek(Duration::from_secs(3)).unwrap();
    assert_eq!(track.position(), Duration::from_millis(100));
    let mut out = vec![0.0_f32; 16];
    assert!(track.read(&mut out).is_finished());
}

#[test]
fn automated_effects_in_a_shared_controller() {
    let mixer = mixer();
    let bus = mixer.add_channel("fx").unwrap();
    let mut track = split_track(4_000);
    track.play();
    let ctl = shared(EffectController::new(2, track));
    {
        let mut c = ctl.lock();
        let gate = EffectDef::Gate {
            length: Timing::beats(0.5),
            gating: ParamF::range(1.0, 0.5),
            low_volume: ParamF::constant(0.0),
        };
        // Quarter note of 8 ms: a 4 ms gate cycle (32 frames).
        c.set_effect(0, 0.008, Some(gate), 1.0).unwrap();
        c.update_effect(0, 0.008, 1.0).unwrap();
        c.set_effect(1, 0.008, Some(EffectKind::Peaking.default_def()), 1.0).unwrap();
    }
    Bus::add_source(&bus, ctl.clone()).unwrap();

    let mut out = vec![0.0_f32; 2 * 32];
    mixer.render(&mut out);
    let left: Vec<f32> = out.iter().step_by(2).copied().collect();
    assert!(left[..15].iter().all(|s| (*s - 0.5).abs() < 1e-3));
    assert!(left[16..31].iter().all(|s| s.abs() < 1e-3));

    // Bypassed: the dry track comes straight through.
    ctl.lock().set_effect_active(0, false).unwrap();
    mixer.render(&mut out);
    assert!(out.iter().step_by(2).all(|s| (*s - 0.5).abs() < 1e-3));
}

#[test]
fn unknown_extensions_are_construction_errors() {
    let err = Track::from_stream("xyz", Box::new(Cursor::new(Vec::<u8>::new()))).unwrap_err();
    assert!(err.is_construction());
}

#[test]
fn bytes_out_of_a_wav() {
    let mixer = mixer();
    let bus = mixer.add_channel("bytes").unwrap();
    let mut track = split_track(64);
    track.play();
    Bus::add_source(&bus, shared(track)).unwrap();
    let mut bytes = vec![0_u8; 4 * 8];
    let len = bytes.len();
    assert_eq!(mixer.read_bytes(&mut bytes, 0, len), 32);
    let samples: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    for lr in samples.chunks_exact(2) {
        assert!((lr[0] - 0.5).abs() < 1e-3);
        assert!((lr[1] + 0.5).abs() < 1e-3);
    }
}

#[test]
fn tracks_play_at_the_mixer_rate() {
    let mixer = Mixer::with_format(AudioFormat::stereo(48_000)).unwrap();
    let bus = mixer.add_channel("music").unwrap();
    let dec = MemoryDecoder::from_interleaved(44_100, vec![0.25; 2 * 44_100]);
    let mut track = Track::from_decoder(Box::new(dec));
    track.play();
    let track = shared(track);
    Bus::add_source(&bus, track.clone()).unwrap();
    assert_eq!(track.lock().output_rate(), 48_000);

    // 100 ms at 48 kHz.
    let mut out = vec![0.0_f32; 2 * 480];
    for _ in 0..10 {
        mixer.render(&mut out);
    }
    let consumed = track.lock().consumed_frames() as i64;
    assert!((consumed - 4_410).abs() <= 1, "{consumed}");
}

#[test]
fn controllers_rebuild_effects_for_the_mixer_rate() {
    let mixer = Mixer::with_format(AudioFormat::stereo(2 * SR)).unwrap();
    let bus = mixer.add_channel("fx").unwrap();
    let mut track = split_track(800);
    track.play();
    let mut ctl = EffectController::new(1, track);
    let gate = EffectDef::Gate {
        length: Timing::seconds(0.004),
        gating: ParamF::constant(0.5),
        low_volume: ParamF::constant(0.0),
    };
    ctl.set_effect(0, 0.5, Some(gate), 1.0).unwrap();
    let ctl = shared(ctl);
    Bus::add_source(&bus, ctl.clone()).unwrap();

    // 4 ms at 16 kHz: 32 open frames, 32 closed.
    let mut out = vec![0.0_f32; 2 * 64];
    mixer.render(&mut out);
    let left: Vec<f32> = out.iter().step_by(2).copied().collect();
    assert!(left[..31].iter().all(|s| (*s - 0.5).abs() < 1e-3));
    assert!(left[33..63].iter().all(|s| s.abs() < 1e-3));
    assert_eq!(ctl.lock().track().output_rate(), 2 * SR);
}
