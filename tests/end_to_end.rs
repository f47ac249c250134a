//! End-to-end tests of the surrogate workflow:
//! synthetic data -> configure -> fit -> combine -> evaluate.

use ft_regress::data::{Sampling, SyntheticConfig, TargetFn, generate};
use ft_regress::domain::{Dataset, RegressAlg};
use ft_regress::io::{ModelFile, read_model_json, write_model_json};
use ft_regress::surrogate::{BuildOptions, FtModel};

fn data(dim: usize, n: usize, target: TargetFn, seed: u64) -> Dataset {
    let config = SyntheticConfig {
        dim,
        n,
        sampling: Sampling::Uniform { lb: -1.0, ub: 1.0 },
        noise: 0.0,
        seed,
    };
    generate(&config, target).unwrap()
}

fn legendre_model(dim: usize, nparam: usize) -> FtModel {
    let mut m = FtModel::new(dim).unwrap();
    for i in 0..dim {
        m.set_dim_opts(i, "legendre", -1.0, 1.0, nparam).unwrap();
    }
    m
}

#[test]
fn adaptive_fits_combine_like_the_true_functions() {
    let dim = 4;
    let d1 = data(dim, 300, TargetFn::Sum, 1);
    let d2 = data(dim, 300, TargetFn::SumSquares, 1);
    let opts = BuildOptions {
        adapt_rank: true,
        kick_rank: 1,
        round_tol: 1e-8,
        max_rank: 4,
        kfold: 3,
        ..BuildOptions::default()
    };

    let mut f1 = legendre_model(dim, 3);
    let s1 = f1.build_data_model(&d1, &opts).unwrap();
    let mut f2 = legendre_model(dim, 3);
    let s2 = f2.build_data_model(&d2, &opts).unwrap();
    assert!(s1.train_rel_err < 1e-6, "{s1:?}");
    assert!(s2.train_rel_err < 1e-6, "{s2:?}");
    assert!(!s2.adapt_history.is_empty());
    assert!(f2.ranks().iter().all(|&r| r <= 4));

    let f3 = (&f1 + &f2).unwrap();
    let f4 = (&f1 * &f2).unwrap();

    for x in [[0.3, -0.2, 0.9, -0.7], [-0.5, 0.5, 0.1, 0.0]] {
        let t1 = TargetFn::Sum.eval(&x);
        let t2 = TargetFn::SumSquares.eval(&x);
        let (e1, e2) = (f1.eval(&x).unwrap(), f2.eval(&x).unwrap());
        assert!((e1 - t1).abs() < 1e-3);
        assert!((e2 - t2).abs() < 1e-3);
        assert!((f3.eval(&x).unwrap() - (e1 + e2)).abs() < 1e-9);
        assert!((f4.eval(&x).unwrap() - e1 * e2).abs() < 1e-9);
        assert!((f3.eval(&x).unwrap() - (t1 + t2)).abs() < 2e-3);
    }
}

#[test]
fn als_fit_matches_aio_on_a_separable_target() {
    let dim = 3;
    let d = data(dim, 150, TargetFn::Product, 4);
    let mut aio = legendre_model(dim, 3);
    aio.build_data_model(&d, &BuildOptions::default()).unwrap();
    let mut als = legendre_model(dim, 3);
    let opts = BuildOptions {
        alg: RegressAlg::Als,
        ..BuildOptions::default()
    };
    als.build_data_model(&d, &opts).unwrap();

    let x = [0.2, -0.6, 0.4];
    let truth = TargetFn::Product.eval(&x);
    assert!((aio.eval(&x).unwrap() - truth).abs() < 1e-3);
    assert!((als.eval(&x).unwrap() - truth).abs() < 1e-3);
}

#[test]
fn integrals_and_norms_match_closed_forms() {
    // f(x) = x0 + x1 on [-1, 1]^2: integral 0, squared L2 norm 2 * (2/3) * 2 = 8/3.
    let d = data(2, 80, TargetFn::Sum, 2);
    let mut f = legendre_model(2, 2);
    f.set_ranks(&[1, 2, 1]).unwrap();
    f.build_data_model(&d, &BuildOptions::default()).unwrap();
    assert!(f.integrate().unwrap().abs() < 1e-5);
    assert!((f.norm().unwrap().powi(2) - 8.0 / 3.0).abs() < 1e-5);
}

#[test]
fn saved_models_evaluate_identically() {
    let d = data(3, 100, TargetFn::SumSquares, 3);
    let mut f = legendre_model(3, 3);
    f.set_ranks(&[1, 2, 2, 1]).unwrap();
    f.build_data_model(&d, &BuildOptions::default()).unwrap();

    let dir = std::env::temp_dir().join(format!("ftr_e2e_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("model.json");
    write_model_json(&path, &ModelFile::from_model(&f, None).unwrap()).unwrap();
    let back = read_model_json(&path).unwrap();
    assert!(back.summary.is_some());
    let g = back.into_model();

    let x = [0.1, 0.2, -0.3];
    assert!((f.eval(&x).unwrap() - g.eval(&x).unwrap()).abs() < 1e-12);
}

#[test]
fn combining_incompatible_models_fails() {
    let d = data(2, 40, TargetFn::Sum, 5);
    let mut a = legendre_model(2, 2);
    a.build_data_model(&d, &BuildOptions::default()).unwrap();

    let mut b = FtModel::new(2).unwrap();
    b.set_dim_opts(0, "legendre", 0.0, 1.0, 2).unwrap();
    b.set_dim_opts(1, "legendre", -1.0, 1.0, 2).unwrap();
    b.build_data_model(&d, &BuildOptions::default()).unwrap();

    assert_eq!((&a + &b).unwrap_err().exit_code(), 2);
    assert_eq!((&a * &b).unwrap_err().exit_code(), 2);

    let three = legendre_model(3, 2);
    assert!(three.eval(&[0.0, 0.0, 0.0]).is_err());
}
