use relu_layer::backprop::{leaky_relu, relu};
use relu_layer::tensor;
use relu_layer::tensors::{Tensor, WithGrad};

#[test]
fn test_relu_backprop() {
    let input = WithGrad {
        value: Tensor::new(vec![3], vec![-1.0, 0.0, 2.0]),
        grad: Tensor::new(vec![3], vec![0.0; 3]),
    };
    let (out, back) = relu(&input);
    assert_eq!(out.data, vec![0.0, 0.0, 2.0]);

    let grad_in = back(&Tensor::new(vec![3], vec![1.0, 1.0, 1.0]));
    assert_eq!(grad_in.data, vec![0.0, 0.0, 1.0]);
}

#[test]
fn test_leaky_relu_backprop_keeps_shape() {
    let input = WithGrad::new(tensor!([[-2.0f32, -1.0], [0.0, 1.0], [2.0, 3.0]]));
    let (out, back) = leaky_relu(&input, 0.1);
    assert_eq!(out.shape, vec![3, 2]);
    assert_eq!(out.data, vec![-0.2, -0.1, 0.0, 1.0, 2.0, 3.0]);

    let grad_in = back(&Tensor::filled(vec![3, 2], 1.0));
    assert_eq!(grad_in.shape, vec![3, 2]);
    assert_eq!(grad_in.data, vec![0.1, 0.1, 0.1, 1.0, 1.0, 1.0]);

    // the closure can be reused
    let again = back(&Tensor::filled(vec![3, 2], 2.0));
    assert_eq!(again.data, vec![0.2, 0.2, 0.2, 2.0, 2.0, 2.0]);
}
