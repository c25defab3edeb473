//! Cadenza CLI: play a file through the mixer, with optional speed, loop and effect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use cadenza_engine::{
    list_output_devices, shared, AudioSource, Bus, BusEvent, BufferSize, EffectController,
    EffectKind, EngineConfig, Mixer, OutputDevice, Track,
};

const SLOTS: usize = 4;

#[derive(Debug, Default)]
struct Args {
    list_devices: bool,
    device_name: Option<String>,
    sample_rate: Option<u32>,
    channels: Option<u16>,
    buffer_frames: Option<u32>,
    duration_sec: Option<u64>,
    speed: Option<f64>,
    /// Seconds, `start:end`.
    loop_area: Option<(f64, f64)>,
    seek_sec: Option<f64>,
    effect: Option<String>,
    mix: Option<f32>,
    alpha: Option<f32>,
    bpm: Option<f64>,
    gain: Option<f32>,
    path: Option<String>,
}

fn parse_loop(s: &str) -> Option<(f64, f64)> {
    let (a, b) = s.split_once(':')?;
    Some((a.parse().ok()?, b.parse().ok()?))
}

fn parse_args() -> Args {
    let mut a = Args::default();
    for s in std::env::args().skip(1) {
        if s == "--list-devices" { a.list_devices = true; continue; }
        if let Some(rest) = s.strip_prefix("--device=")      { a.device_name   = Some(rest.to_string()); continue; }
        if let Some(rest) = s.strip_prefix("--sample-rate=") { a.sample_rate   = rest.parse().ok();      continue; }
        if let Some(rest) = s.strip_prefix("--channels=")    { a.channels      = rest.parse().ok();      continue; }
        if let Some(rest) = s.strip_prefix("--buffer=")      { a.buffer_frames = rest.parse().ok();      continue; }
        if let Some(rest) = s.strip_prefix("--duration=")    { a.duration_sec  = rest.parse().ok();      continue; }
        if let Some(rest) = s.strip_prefix("--speed=")       { a.speed         = rest.parse().ok();      continue; }
        if let Some(rest) = s.strip_prefix("--loop=")        { a.loop_area     = parse_loop(rest);       continue; }
        if let Some(rest) = s.strip_prefix("--seek=")        { a.seek_sec      = rest.parse().ok();      continue; }
        if let Some(rest) = s.strip_prefix("--effect=")      { a.effect        = Some(rest.to_string()); continue; }
        if let Some(rest) = s.strip_prefix("--mix=")         { a.mix           = rest.parse().ok();      continue; }
        if let Some(rest) = s.strip_prefix("--alpha=")       { a.alpha         = rest.parse().ok();      continue; }
        if let Some(rest) = s.strip_prefix("--bpm=")         { a.bpm           = rest.parse().ok();      continue; }
        if let Some(rest) = s.strip_prefix("--gain=")        { a.gain          = rest.parse().ok();      continue; }
        if !s.starts_with("--") && a.path.is_none() { a.path = Some(s); continue; }
        log::warn!("unknown arg: {s}");
    }
    a
}

fn print_usage() {
    println!("usage: cadenza <file> [--speed=X] [--loop=START:END] [--seek=SEC]");
    println!("               [--effect=NAME] [--mix=0..1] [--alpha=0..1] [--bpm=N]");
    println!("               [--device=NAME] [--sample-rate=HZ] [--channels=1|2]");
    println!("               [--buffer=FRAMES] [--duration=SEC] [--gain=0..1]");
    println!("       cadenza --list-devices");
    let names: Vec<&str> = EffectKind::ALL.iter().map(|k| k.name()).collect();
    println!("effects: {}", names.join(", "));
}

fn build_config(args: &Args) -> EngineConfig {
    let mut cfg = EngineConfig::from_env();
    if let Some(sr) = args.sample_rate { cfg = cfg.with_sample_rate(sr); }
    if let Some(ch) = args.channels    { cfg = cfg.with_channels(ch); }
    if let Some(n) = args.buffer_frames { cfg = cfg.with_buffer_size(BufferSize::Fixed(n)); }
    cfg
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn open_track(args: &Args, path: &str) -> Result<Track> {
    let mut track = Track::open(path).with_context(|| format!("opening {path}"))?;
    if let Some(speed) = args.speed {
        track.set_speed(speed);
    }
    if let Some((start, end)) = args.loop_area {
        let rate = f64::from(track.source_format().sample_rate);
        let (s, e) = ((start.max(0.0) * rate) as u64, (end.max(0.0) * rate) as u64);
        track.set_loop_area(s, e).context("setting loop area")?;
    }
    if let Some(sec) = args.seek_sec {
        track.seek(Duration::from_secs_f64(sec.max(0.0))).context("seeking")?;
    }
    Ok(track)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = parse_args();

    if args.list_devices {
        println!("Available output devices ({}):", cpal::default_host().id().name());
        for name in list_output_devices()? {
            println!("- {name}");
        }
        return Ok(());
    }
    let Some(path) = args.path.clone() else {
        print_usage();
        return Ok(());
    };

    let cfg = build_config(&args);
    let mixer = Arc::new(Mixer::new(cfg)?);
    let music = mixer.add_channel("music")?;

    let mut track = open_track(&args, &path)?;
    track.play();
    let mut ctl = EffectController::new(SLOTS, track);
    ctl.set_volume(args.gain.unwrap_or(1.0));

    let qn_dur = 60.0 / args.bpm.unwrap_or(120.0).max(1.0);
    if let Some(name) = &args.effect {
        let Some(kind) = EffectKind::from_name(name) else {
            print_usage();
            bail!("unknown effect: {name}");
        };
        ctl.set_effect(0, qn_dur, Some(kind.default_def()), args.mix.unwrap_or(1.0))?;
        ctl.update_effect(0, qn_dur, args.alpha.unwrap_or(0.0))?;
        log::info!("effect: {kind} (bpm {:.1})", 60.0 / qn_dur);
    }

    let ctl = shared(ctl);
    Bus::add_source(&music, ctl.clone())?;
    let events = music.lock().events();

    let device = OutputDevice::open(mixer.clone(), args.device_name.as_deref(), cfg.buffer_size)?;
    println!("Using device: {}", device.name());
    println!("Stream config: {:?} (sample_format: {:?})", device.config(), device.sample_format());
    if let Some(d) = args.duration_sec { println!("Auto-stop after {d} seconds"); }
    println!("Press Ctrl+C to stop…\n");

    let started = Instant::now();
    let limit = args.duration_sec.map(Duration::from_secs);
    loop {
        std::thread::sleep(Duration::from_millis(100));
        if let Ok(BusEvent::SourceFinished { .. }) = events.try_recv() {
            log::info!("playback finished");
            break;
        }
        if limit.is_some_and(|l| started.elapsed() >= l) {
            break;
        }
    }
    log::debug!("stopped at {:?}", ctl.lock().track().position());
    Ok(())
}
