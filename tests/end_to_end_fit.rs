use psd_fit::data::{SynthConfig, SynthExcitation, generate_measurement};
use psd_fit::fit::{FitPsdOptions, PsdFit};
use psd_fit::models::lorentzian_psd;
use psd_fit::physics::{BOLTZMANN, stokes_drag};
use psd_fit::psd::{ExperimentalSetting, Psd, PsdMeasurement};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Gamma};

const D: f64 = 2e-6;
const FC: f64 = 800.0;
const N_AVG: u32 = 1000;

/// Lorentzian spectrum with the chi-square scatter of an `N_AVG`-fold average.
fn noisy_measurement(seed: u64) -> PsdMeasurement {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = f64::from(N_AVG);
    let gamma = Gamma::new(n, 1.0 / n).unwrap();
    let freq: Vec<f64> = (1..=500).map(|i| f64::from(i) * 10.0).collect();
    let psd: Vec<f64> = freq
        .iter()
        .map(|&f| lorentzian_psd(f, D, FC) * gamma.sample(&mut rng))
        .collect();

    let setting = ExperimentalSetting::new(298.15, 0.5e-6).unwrap();
    let mut m = PsdMeasurement::new(setting);
    m.add_psd("x", Psd::new("x", freq, psd, None, N_AVG).unwrap());
    m
}

#[test]
fn noisy_lorentzian_is_recovered() {
    let mut fit = PsdFit::new(noisy_measurement(11), 0.95);
    fit.analytical_lorentzian_fit(None, 20).unwrap();
    fit.fit_psds(None, &FitPsdOptions::default()).unwrap();

    let r = fit.fit("x").unwrap();
    assert!((r.fc.value / FC - 1.0).abs() < 0.02, "fc {}", r.fc.value);
    assert!((r.d.value / D - 1.0).abs() < 0.02, "D {}", r.d.value);
    assert!(r.fc.err > 0.0 && r.fc.err < 0.02 * FC);

    let band = 3.0 * (2.0 / r.nfree).sqrt();
    assert!((r.redchi2 - 1.0).abs() < band, "redchi2 {} (nfree {})", r.redchi2, r.nfree);
    assert!(!r.is_outlier());
    assert!(fit.pc_results().contains_key("x"));
}

#[test]
fn analytical_and_iterative_fits_agree() {
    let mut fit = PsdFit::new(noisy_measurement(5), 0.95);
    fit.analytical_lorentzian_fit(None, 20).unwrap();
    fit.fit_psds(None, &FitPsdOptions::default()).unwrap();

    let anal = fit.analytical_fit("x").unwrap();
    let iter = fit.fit("x").unwrap();
    assert!((anal.fc.value / iter.fc.value - 1.0).abs() < 0.03);
}

#[test]
fn synthetic_active_calibration_matches_passive() {
    let config = SynthConfig {
        axes: vec!["x".into(), "y".into()],
        fc: vec![800.0, 600.0],
        excitation: Some(SynthExcitation {
            axis: "x".into(),
            frequency: 30.0,
            amplitude: 150e-9,
        }),
        ..SynthConfig::default()
    };
    let (m, _) = generate_measurement(&config).unwrap();
    let setting = m.setting().clone();
    let drag = stokes_drag(setting.radius(), setting.viscosity());
    let beta = (BOLTZMANN * setting.temp() / drag / config.diffusion).sqrt();

    let mut fit = PsdFit::new(m, 0.95);
    fit.analytical_lorentzian_fit(None, 20).unwrap();
    fit.fit_psds(None, &FitPsdOptions::default()).unwrap();

    for axis in ["x", "y"] {
        let pc = &fit.pc_results()[axis];
        let ac = &fit.ac_results()[axis];
        assert!((pc.dissens / beta - 1.0).abs() < 0.05, "{axis}: passive beta {}", pc.dissens);
        assert!((ac.dissens / beta - 1.0).abs() < 0.1, "{axis}: active beta {}", ac.dissens);
        assert!((ac.drag / drag - 1.0).abs() < 0.2, "{axis}: active drag {}", ac.drag);
    }
    assert!(fit.ac_results()["x"].excited);
    assert!(!fit.ac_results()["y"].excited);
}
