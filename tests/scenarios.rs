//! End-to-end behaviour through the public API: register programming,
//! clock-domain conversion, envelopes, the filter and snapshots.

use sidkit::nodes::{FilterNode, FilterParams, FilterType, Node, OscillatorNode, OscillatorParams, Waveform};
use sidkit::sid::{EnvelopeState, Oscillator};
use sidkit::{
    Chip, ChipModel, ClockAccumulator, SamplingConfig, SamplingMethod, SidBackend, SidEngine,
    PAL_CLOCK_HZ,
};

const HOST_RATE: f64 = 48_000.0;

/// Voice 1: 440 Hz sawtooth, A0 D9 S0 R9, volume 15, no filter routing.
fn program_sawtooth(sid: &mut impl SidBackend, gate: bool) {
    sid.load_registers(&[
        0x45, 0x1d, 0x00, 0x08, 0x20 | gate as u8, 0x09, 0x09, //
        0, 0, 0, 0, 0, 0, 0, //
        0, 0, 0, 0, 0, 0, 0, //
        0x00, 0x00, 0x00, 0x0f,
    ]);
}

#[test]
fn test_adsr_scenario_440hz_sawtooth() {
    let mut engine = SidEngine::with_rates(ChipModel::Mos6581, HOST_RATE, PAL_CLOCK_HZ)
        .expect("valid rates");
    program_sawtooth(&mut engine, true);

    let mut levels = Vec::with_capacity(24_000);
    for _ in 0..24_000 {
        engine.render_sample();
        levels.push(engine.chip().envelope_output(0));
    }

    let peak = levels
        .iter()
        .position(|&l| l == 0xff)
        .expect("attack reaches the top");
    assert!(peak < 200, "attack 0 peaks within ~2 ms, got sample {peak}");
    assert!(
        levels[peak..].windows(2).all(|w| w[1] <= w[0]),
        "decay never rises"
    );
    assert!(levels[23_999] < 0xff, "decay under way by the gate-off");
    assert_eq!(
        engine.chip().synth().voices[0].envelope.state(),
        EnvelopeState::DecaySustain
    );

    // Gate off; release 9 is 750 ms nominal, allow the full exponential tail.
    engine.write_register(0x04, 0x20);
    let mut tail = Vec::with_capacity(48_000);
    for _ in 0..48_000 {
        engine.render_sample();
        tail.push(engine.chip().envelope_output(0));
    }
    assert!(tail.windows(2).all(|w| w[1] <= w[0]), "release never rises");
    let silent = tail.iter().position(|&l| l == 0).expect("release reaches 0");
    assert!(tail[silent..].iter().all(|&l| l == 0), "level 0 holds");
}

#[test]
fn test_adsr_delay_bug_through_registers() {
    let mut chip = Chip::new(ChipModel::Mos8580);
    chip.write(0x05, 0xf0); // Attack 15: period 31251
    chip.write(0x04, 0x21);
    chip.clock_delta(20_000);
    assert_eq!(chip.envelope_output(0), 0);

    // Period drops below the counter: no step until it wraps through 0x8000.
    chip.write(0x05, 0x00);
    chip.clock_delta(12_000);
    assert_eq!(chip.envelope_output(0), 0, "counter still wrapping");
    chip.clock_delta(1_000);
    assert!(chip.envelope_output(0) > 0, "attack resumes after the wrap");
}

#[test]
fn test_lowpass_passes_1khz_at_max_cutoff() {
    for model in [ChipModel::Mos6581, ChipModel::Mos8580] {
        let params = FilterParams {
            cutoff: 1.0,
            resonance: 0.0,
            filter_type: FilterType::LowPass,
            chip_model: model,
            ..FilterParams::default()
        };
        let level = |freq: f32| {
            let input: Vec<f32> = (0..9600)
                .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / HOST_RATE as f32).sin())
                .collect();
            let mut output = vec![0.0; input.len()];
            let mut node = FilterNode::new(params, HOST_RATE).expect("valid");
            node.process_buffer(&input, &mut output);
            let tail = &output[4800..];
            let mean = tail.iter().sum::<f32>() / tail.len() as f32;
            (tail.iter().map(|s| (s - mean).powi(2)).sum::<f32>() / tail.len() as f32).sqrt()
        };
        let passband = level(100.0);
        let at_1k = level(1000.0);
        assert!(passband > 0.1, "{model}: signal passes at all");
        assert!(
            at_1k > 0.7 * passband,
            "{model}: 1 kHz {at_1k} vs 100 Hz {passband}"
        );
    }
}

#[test]
fn test_identical_noise_oscillators() {
    let mut a = Oscillator::new(ChipModel::Mos6581);
    let mut b = Oscillator::new(ChipModel::Mos6581);
    for osc in [&mut a, &mut b] {
        osc.write_freq_lo(0x00);
        osc.write_freq_hi(0x40);
        osc.write_control(0x80);
    }
    for _ in 0..10_000 {
        a.clock_delta(21);
        b.clock_delta(21);
        assert_eq!(a.output(a.accumulator()), b.output(b.accumulator()));
    }

    let params = OscillatorParams {
        waveform: Waveform::Noise,
        ..OscillatorParams::default()
    };
    let mut x = OscillatorNode::new(params, ChipModel::Mos6581, HOST_RATE).expect("valid");
    let mut y = OscillatorNode::new(params, ChipModel::Mos6581, HOST_RATE).expect("valid");
    let mut out_x = vec![0.0; 4096];
    let mut out_y = vec![0.0; 4096];
    x.process(&[], &mut out_x);
    y.process(&[], &mut out_y);
    assert_eq!(out_x, out_y);
}

#[test]
fn test_determinism_and_reset_independence() {
    let render = |engine: &mut SidEngine| {
        let mut buffer = vec![0i16; 9600];
        engine.render(&mut buffer);
        buffer
    };

    let mut a = SidEngine::new(ChipModel::Mos6581);
    let mut b = SidEngine::new(ChipModel::Mos6581);
    program_sawtooth(&mut a, true);
    program_sawtooth(&mut b, true);
    assert_eq!(render(&mut a), render(&mut b));

    // Different history, same post-reset behaviour.
    a.write_register(0x18, 0x3f);
    a.write_register(0x0b, 0x81);
    let _ = render(&mut a);
    a.reset();
    b.reset();
    program_sawtooth(&mut a, true);
    program_sawtooth(&mut b, true);
    assert_eq!(render(&mut a), render(&mut b));
}

#[test]
fn test_unrouted_output_ignores_filter_settings() {
    let run = |fc_hi: u8, res: u8| {
        let mut engine = SidEngine::new(ChipModel::Mos6581);
        program_sawtooth(&mut engine, true);
        engine.write_register(0x16, fc_hi);
        engine.write_register(0x17, res << 4); // routing 0
        let mut buffer = vec![0i16; 4800];
        engine.render(&mut buffer);
        buffer
    };
    assert_eq!(run(0x00, 0x0), run(0xff, 0xf));
}

#[test]
fn test_cross_modulation_disabled_is_bit_exact() {
    let mut plain = SidEngine::new(ChipModel::Mos8580);
    let mut routed = SidEngine::new(ChipModel::Mos8580);
    routed.chip_mut().set_fm(0, 3, 255);
    for engine in [&mut plain, &mut routed] {
        program_sawtooth(engine, true);
        engine.write_register(0x0f, 0x08);
        engine.write_register(0x12, 0x11);
        engine.write_register(0x14, 0xf0);
    }
    let mut out_plain = vec![0i16; 4800];
    let mut out_routed = vec![0i16; 4800];
    plain.render(&mut out_plain);
    routed.render(&mut out_routed);
    assert_eq!(out_plain, out_routed);
}

#[test]
fn test_snapshot_restores_exact_continuation() {
    let mut engine = SidEngine::new(ChipModel::Mos6581);
    program_sawtooth(&mut engine, true);
    engine.write_register(0x17, 0x31);
    let mut warmup = vec![0i16; 1234];
    engine.render(&mut warmup);

    let json = serde_json::to_string(&engine.chip().read_state()).expect("serialize");
    let mut restored = Chip::new(ChipModel::Mos6581);
    restored.write_state(&serde_json::from_str(&json).expect("deserialize"));

    for _ in 0..2000 {
        engine.chip_mut().clock_delta(20);
        restored.clock_delta(20);
        assert_eq!(engine.chip().output(), restored.output());
    }
}

#[test]
fn test_sampling_methods_fill_requested_samples() {
    for method in [
        SamplingMethod::Fast,
        SamplingMethod::Interpolate,
        SamplingMethod::Resample,
    ] {
        let mut chip = Chip::new(ChipModel::Mos6581);
        SamplingConfig::pal(44_100.0)
            .with_method(method)
            .apply(&mut chip)
            .expect("valid config");
        for (addr, value) in [(0x01, 0x1d), (0x05, 0x00), (0x06, 0xf0), (0x18, 0x0f), (0x04, 0x41)] {
            chip.write(addr, value);
        }
        chip.write(0x03, 0x08);

        let mut buffer = vec![0i16; 4410];
        let mut written = 0;
        while written < buffer.len() {
            let mut delta = 985;
            written += chip.clock_samples(&mut delta, &mut buffer[written..], 1);
        }
        assert_eq!(written, 4410, "{method}");
        assert!(
            buffer.iter().any(|&s| s != buffer[0]),
            "{method} produced a signal"
        );
    }
}

#[test]
fn test_backend_methods_at_edge_rates() {
    let cases = [
        (SamplingConfig::pal(61.0), SamplingMethod::Interpolate, 61),
        (SamplingConfig::pal(61.0), SamplingMethod::Fast, 61),
        (SamplingConfig::ntsc(22_050.0), SamplingMethod::Resample, 22_050),
        (SamplingConfig::pal(96_000.0), SamplingMethod::Resample, 96_000),
    ];
    for (config, method, rate) in cases {
        let config = config.with_method(method);
        let mut engine = SidEngine::with_config(ChipModel::Mos8580, &config).expect("valid config");
        program_sawtooth(&mut engine, true);
        engine.write_register(0x0e, 0x01); // Voice 3 counts cycles
        let mut buffer = vec![0i16; rate / 4];
        engine.render(&mut buffer);

        let elapsed = engine.chip().synth().voices[2].osc.accumulator() as f64;
        let expected = buffer.len() as f64 * config.clock_frequency / config.sample_rate;
        assert!(
            (elapsed - expected).abs() <= 2.0,
            "{method} at {rate} Hz: {elapsed} cycles vs {expected}"
        );
    }

    for rate in [20.0, 40.0] {
        assert!(SidEngine::with_config(ChipModel::Mos6581, &SamplingConfig::pal(rate)).is_err());
    }
}

#[test]
fn test_clock_accumulator_has_no_drift() {
    let mut clock = ClockAccumulator::new(44_100.0, PAL_CLOCK_HZ).expect("valid");
    let total: u64 = (0..441_000).map(|_| clock.cycles_for_next_sample() as u64).sum();
    let expected = PAL_CLOCK_HZ * 10.0;
    assert!((total as f64 - expected).abs() < 1.0, "{total} vs {expected}");
}
