//! Loss functions in graph form.
//!
//! Loss functions are plain Rust functions over symbolic `Tensor`s that add
//! the nodes computing the error to the graph being traced.
//!
//! The two-argument forms (`mse_loss(y_pred, y_true)`) compose freely inside
//! other traced code. The `*_objective` forms have the signature expected by
//! [`ModuleExt::gradient`](crate::nn::ModuleExt::gradient): the first extra
//! argument is the target, and a missing target means zero.

use crate::tensor::Tensor;

// ============================================================================
// MSE (Mean Squared Error)
// ============================================================================

/// `sum((y_pred - y_true)^2)`.
pub fn mse_loss(y_pred: &Tensor, y_true: &Tensor) -> Tensor {
    let error = y_pred - y_true;
    let squared_error = &error * &error;
    squared_error.sum()
}

/// `mean((y_pred - y_true)^2)`.
pub fn mse_loss_mean(y_pred: &Tensor, y_true: &Tensor) -> Tensor {
    let error = y_pred - y_true;
    let squared_error = &error * &error;
    squared_error.mean()
}

// ============================================================================
// Binary Cross-Entropy
// ============================================================================

/// Binary cross-entropy for predictions already squashed into `(0, 1)`.
///
/// Formula: `-mean(y * log(p + eps) + (1 - y) * log(1 - p + eps))`.
pub fn binary_cross_entropy(y_pred: &Tensor, y_true: &Tensor, eps: f32) -> Tensor {
    let log_p = y_pred.add_scalar(eps).log();
    let one_minus_p = y_pred.scale(-1.0).add_scalar(1.0);
    let log_not_p = one_minus_p.add_scalar(eps).log();
    let one_minus_y = y_true.scale(-1.0).add_scalar(1.0);
    let likelihood = &(y_true * &log_p) + &(&one_minus_y * &log_not_p);
    -likelihood.mean()
}

// ============================================================================
// Objectives for `gradient`
// ============================================================================

fn target(prediction: &Tensor, extra: &[Tensor]) -> Tensor {
    extra.first().cloned().unwrap_or_else(|| prediction.scalar(0.0))
}

pub fn mse_objective(prediction: &Tensor, extra: &[Tensor]) -> Tensor {
    mse_loss(prediction, &target(prediction, extra))
}

pub fn mse_mean_objective(prediction: &Tensor, extra: &[Tensor]) -> Tensor {
    mse_loss_mean(prediction, &target(prediction, extra))
}

pub fn bce_objective(prediction: &Tensor, extra: &[Tensor]) -> Tensor {
    binary_cross_entropy(prediction, &target(prediction, extra), 1e-7)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asg::Value;
    use crate::runtime::{Backend, CpuBackend, Memo};
    use crate::tensor::GraphContext;
    use ndarray::{arr0, array};

    fn eval(loss: fn(&Tensor, &Tensor) -> Tensor, pred: Value, target: Value) -> f32 {
        let ctx = GraphContext::shared();
        let p = Tensor::new_input(&ctx, "p");
        let t = Tensor::new_input(&ctx, "t");
        let l = loss(&p, &t);
        let mut graph = ctx.borrow().main_graph().clone();
        graph.set_output(l.node_id);
        let mut memo = Memo::new();
        memo.insert(p.node_id, pred);
        memo.insert(t.node_id, target);
        let (out, _) = CpuBackend::new().run(&graph, memo).unwrap();
        out[0].iter().copied().next().unwrap()
    }

    #[test]
    fn mse_sum_and_mean() {
        let p = array![1.0f32, 2.0, 3.0].into_dyn();
        let t = array![1.0f32, 0.0, 0.0].into_dyn();
        assert_eq!(eval(mse_loss, p.clone(), t.clone()), 13.0);
        assert!((eval(mse_loss_mean, p, t) - 13.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn bce_of_confident_correct_prediction_is_small() {
        let bce = |p: &Tensor, t: &Tensor| binary_cross_entropy(p, t, 1e-7);
        let good = eval(bce, array![0.99f32, 0.01].into_dyn(), array![1.0f32, 0.0].into_dyn());
        let bad = eval(bce, array![0.01f32, 0.99].into_dyn(), array![1.0f32, 0.0].into_dyn());
        assert!(good < 0.02);
        assert!(bad > 4.0);
    }

    #[test]
    fn objective_without_target_compares_with_zero() {
        let ctx = GraphContext::shared();
        let p = Tensor::new_input(&ctx, "p");
        let l = mse_objective(&p, &[]);
        let mut graph = ctx.borrow().main_graph().clone();
        graph.set_output(l.node_id);
        let mut memo = Memo::new();
        memo.insert(p.node_id, array![3.0f32, 4.0].into_dyn());
        let (out, _) = CpuBackend::new().run(&graph, memo).unwrap();
        assert_eq!(out[0], arr0(25.0f32).into_dyn());
    }
}
