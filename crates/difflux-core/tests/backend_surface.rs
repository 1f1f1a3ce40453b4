//! Integration tests for the backend operation surface.

use difflux_core::prelude::*;
use proptest::prelude::*;
use std::sync::Arc;

fn cpu() -> CpuBackend {
    CpuBackend::with_seed(99)
}

#[test]
fn tensors_survive_backend_swap() {
    let first: Arc<dyn Backend> = Arc::new(CpuBackend::with_seed(1));
    let second: Arc<dyn Backend> = Arc::new(CpuBackend::with_seed(2));

    let guard = push_backend(first);
    let t = active_backend().unwrap().as_tensor(HostValue::from(vec![1.0, 2.0, 3.0])).unwrap();
    drop(guard);

    // A tensor produced under one backend stays readable under another.
    let _guard = push_backend(second);
    let doubled = active_backend().unwrap().add(&t, &t).unwrap();
    assert_eq!(doubled.to_f64_vec().unwrap(), vec![2.0, 4.0, 6.0]);
}

#[test]
fn reductions_and_elementwise_compose() {
    let b = cpu();
    let x = b.as_tensor(HostValue::from(vec![vec![1.0, 2.0], vec![3.0, 4.0]])).unwrap();
    let centered = b.sub(&x, &b.mean(&x, None, false).unwrap()).unwrap();
    let total = b.sum(&centered, None, false).unwrap();
    assert!(total.scalar_f64().unwrap().abs() < 1e-12);
}

#[test]
fn gather_inverts_scatter_write() {
    let b = cpu();
    let base = b.zeros(&Shape::from([5, 1]), None).unwrap();
    let indices = b
        .reshape(&Tensor::from_i64s(vec![4, 1]), &Shape::from([2, 1]))
        .unwrap();
    let updates = b
        .reshape(&Tensor::from_f64s(vec![7.0, 8.0]), &Shape::from([2, 1]))
        .unwrap();
    let written = b.scatter_write(&base, &indices, &updates).unwrap();
    let read = b.gather(&written, &Tensor::from_i64s(vec![4, 1])).unwrap();
    assert_eq!(read.to_f64_vec().unwrap(), vec![7.0, 8.0]);
}

proptest! {
    #[test]
    fn cast_to_own_dtype_is_identity(values in prop::collection::vec(-1e6f64..1e6, 1..32)) {
        let b = cpu();
        let t = Tensor::from_f64s(values);
        let same = b.cast(&t, t.dtype()).unwrap();
        prop_assert_eq!(&same, &t);
    }

    #[test]
    fn float_int_float_cast_fixes_integers(values in prop::collection::vec(-1000i64..1000, 1..32)) {
        let b = cpu();
        let ints = Tensor::from_i64s(values.clone());
        let floats = b.cast(&ints, DType::FLOAT64).unwrap();
        let back = b.cast(&floats, DType::INT64).unwrap();
        prop_assert_eq!(back.to_i64_vec().unwrap(), values);
    }

    #[test]
    fn sum_matches_reference(values in prop::collection::vec(-1e3f64..1e3, 1..64)) {
        let b = cpu();
        let expected: f64 = values.iter().sum();
        let total = b.sum(&Tensor::from_f64s(values), None, false).unwrap();
        prop_assert!((total.scalar_f64().unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn transpose_is_involutive(rows in 1usize..6, cols in 1usize..6) {
        let b = cpu();
        let data: Vec<f64> = (0..rows * cols).map(|i| i as f64).collect();
        let t = b.reshape(&Tensor::from_f64s(data), &Shape::from([rows, cols])).unwrap();
        let back = b.transpose(&b.transpose(&t, &[1, 0]).unwrap(), &[1, 0]).unwrap();
        prop_assert_eq!(back, t);
    }
}
