//! Feed-forward Mood Network
//!
//! A small dense network: hidden layers with a configurable
//! activation, a linear output layer, softmax on top, cross-entropy loss.
//! Trained with mini-batch momentum SGD:
//!
//!   velocity[t] = momentum * velocity[t-1] - lr * gradient
//!   weight[t]   = weight[t-1] + velocity[t]
//!
//! Weights live in flat row-major `Vec<f32>` buffers (`outputs × inputs`).

use super::{MoodError, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const LOG_EPSILON: f32 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Relu,
    Sigmoid,
    Tanh,
}

impl Activation {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "relu" => Some(Activation::Relu),
            "sigmoid" => Some(Activation::Sigmoid),
            "tanh" => Some(Activation::Tanh),
            _ => None,
        }
    }

    fn apply(self, x: f32) -> f32 {
        match self {
            Activation::Relu => x.max(0.0),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Tanh => x.tanh(),
        }
    }

    /// Derivative given the pre-activation `z` and the activated output `a`
    fn derivative(self, z: f32, a: f32) -> f32 {
        match self {
            Activation::Relu => {
                if z > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Sigmoid => a * (1.0 - a),
            Activation::Tanh => 1.0 - a * a,
        }
    }
}

/// One labelled example: feature vector and target distribution
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub features: Vec<f32>,
    pub target: Vec<f32>,
}

#[derive(Debug, Clone)]
struct DenseLayer {
    inputs: usize,
    outputs: usize,
    weights: Vec<f32>,
    biases: Vec<f32>,
    weight_velocity: Vec<f32>,
    bias_velocity: Vec<f32>,
}

impl DenseLayer {
    /// Xavier-uniform initialisation
    fn new(inputs: usize, outputs: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (inputs + outputs) as f32).sqrt();
        let weights = (0..inputs * outputs)
            .map(|_| rng.gen_range(-limit..limit))
            .collect();

        Self {
            inputs,
            outputs,
            weights,
            biases: vec![0.0; outputs],
            weight_velocity: vec![0.0; inputs * outputs],
            bias_velocity: vec![0.0; outputs],
        }
    }

    fn forward(&self, input: &[f32]) -> Vec<f32> {
        (0..self.outputs)
            .map(|o| {
                let row = &self.weights[o * self.inputs..(o + 1) * self.inputs];
                row.iter().zip(input).map(|(w, x)| w * x).sum::<f32>() + self.biases[o]
            })
            .collect()
    }
}

/// Activations recorded during a forward pass, needed for backprop
struct ForwardTrace {
    /// `pre[l]` = pre-activation output of layer `l`
    pre: Vec<Vec<f32>>,
    /// `post[0]` = input, `post[l + 1]` = activated output of layer `l`
    post: Vec<Vec<f32>>,
}

#[derive(Debug, Clone)]
pub struct FeedForwardNetwork {
    layers: Vec<DenseLayer>,
    activation: Activation,
}

impl FeedForwardNetwork {
    pub fn new(
        input_size: usize,
        hidden_layers: &[usize],
        output_size: usize,
        activation: Activation,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut sizes = Vec::with_capacity(hidden_layers.len() + 2);
        sizes.push(input_size);
        sizes.extend_from_slice(hidden_layers);
        sizes.push(output_size);

        let layers = sizes
            .windows(2)
            .map(|pair| DenseLayer::new(pair[0], pair[1], &mut rng))
            .collect();

        Self { layers, activation }
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, |l| l.inputs)
    }

    pub fn output_size(&self) -> usize {
        self.layers.last().map_or(0, |l| l.outputs)
    }

    fn trace(&self, input: &[f32]) -> ForwardTrace {
        let last = self.layers.len().saturating_sub(1);
        let mut pre = Vec::with_capacity(self.layers.len());
        let mut post = Vec::with_capacity(self.layers.len() + 1);
        post.push(input.to_vec());

        for (l, layer) in self.layers.iter().enumerate() {
            let z = layer.forward(&post[l]);
            let a = if l == last {
                z.clone()
            } else {
                z.iter().map(|&v| self.activation.apply(v)).collect()
            };
            pre.push(z);
            post.push(a);
        }

        ForwardTrace { pre, post }
    }

    /// Raw output logits
    pub fn forward(&self, input: &[f32]) -> Result<Vec<f32>> {
        if input.len() != self.input_size() {
            return Err(MoodError::InvalidInput(format!(
                "Expected {} features, got {}",
                self.input_size(),
                input.len()
            )));
        }
        let mut trace = self.trace(input);
        Ok(trace.post.pop().unwrap_or_default())
    }

    /// Softmax probabilities over the output classes
    pub fn predict(&self, input: &[f32]) -> Result<Vec<f32>> {
        Ok(softmax(&self.forward(input)?))
    }

    /// One momentum-SGD step over a mini-batch, returns mean cross-entropy
    pub fn train_batch(&mut self, batch: &[&TrainingExample], learning_rate: f32, momentum: f32) -> f32 {
        if batch.is_empty() {
            return 0.0;
        }

        let mut weight_grads: Vec<Vec<f32>> = self.layers.iter().map(|l| vec![0.0; l.weights.len()]).collect();
        let mut bias_grads: Vec<Vec<f32>> = self.layers.iter().map(|l| vec![0.0; l.biases.len()]).collect();
        let mut total_loss = 0.0;

        for example in batch {
            let trace = self.trace(&example.features);
            let probs = softmax(trace.post.last().map(Vec::as_slice).unwrap_or(&[]));

            total_loss -= probs
                .iter()
                .zip(&example.target)
                .map(|(p, y)| y * (p + LOG_EPSILON).ln())
                .sum::<f32>();

            // softmax + cross-entropy gradient w.r.t. logits
            let mut delta: Vec<f32> = probs.iter().zip(&example.target).map(|(p, y)| p - y).collect();

            for l in (0..self.layers.len()).rev() {
                let layer = &self.layers[l];
                let input = &trace.post[l];

                for o in 0..layer.outputs {
                    bias_grads[l][o] += delta[o];
                    let row = &mut weight_grads[l][o * layer.inputs..(o + 1) * layer.inputs];
                    for (g, x) in row.iter_mut().zip(input) {
                        *g += delta[o] * x;
                    }
                }

                if l > 0 {
                    delta = (0..layer.inputs)
                        .map(|i| {
                            let back: f32 = (0..layer.outputs)
                                .map(|o| layer.weights[o * layer.inputs + i] * delta[o])
                                .sum();
                            back * self.activation.derivative(trace.pre[l - 1][i], input[i])
                        })
                        .collect();
                }
            }
        }

        let scale = 1.0 / batch.len() as f32;
        for (l, layer) in self.layers.iter_mut().enumerate() {
            for ((w, v), g) in layer
                .weights
                .iter_mut()
                .zip(layer.weight_velocity.iter_mut())
                .zip(&weight_grads[l])
            {
                *v = momentum * *v - learning_rate * g * scale;
                *w += *v;
            }
            for ((b, v), g) in layer
                .biases
                .iter_mut()
                .zip(layer.bias_velocity.iter_mut())
                .zip(&bias_grads[l])
            {
                *v = momentum * *v - learning_rate * g * scale;
                *b += *v;
            }
        }

        total_loss * scale
    }

    /// Sum of absolute first-layer weights leaving each input feature
    pub fn input_importance(&self) -> Vec<f32> {
        let Some(first) = self.layers.first() else {
            return Vec::new();
        };
        (0..first.inputs)
            .map(|i| {
                (0..first.outputs)
                    .map(|o| first.weights[o * first.inputs + i].abs())
                    .sum()
            })
            .collect()
    }
}

/// Numerically stable softmax; empty input gives empty output
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    if logits.is_empty() {
        return Vec::new();
    }
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum == 0.0 || !sum.is_finite() {
        return vec![1.0 / logits.len() as f32; logits.len()];
    }
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xor_like_examples() -> Vec<TrainingExample> {
        vec![
            TrainingExample { features: vec![0.0, 0.0], target: vec![1.0, 0.0] },
            TrainingExample { features: vec![1.0, 1.0], target: vec![1.0, 0.0] },
            TrainingExample { features: vec![0.0, 1.0], target: vec![0.0, 1.0] },
            TrainingExample { features: vec![1.0, 0.0], target: vec![0.0, 1.0] },
        ]
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);

        // Large logits must not overflow
        let probs = softmax(&[1000.0, 1000.0]);
        assert!((probs[0] - 0.5).abs() < 1e-5);
        assert!(softmax(&[]).is_empty());
    }

    #[test]
    fn test_activation_parse() {
        assert_eq!(Activation::parse("ReLU"), Some(Activation::Relu));
        assert_eq!(Activation::parse("tanh"), Some(Activation::Tanh));
        assert_eq!(Activation::parse("sigmoid"), Some(Activation::Sigmoid));
        assert_eq!(Activation::parse("gelu"), None);
    }

    #[test]
    fn test_invalid_feature_vector_size() {
        let network = FeedForwardNetwork::new(4, &[3], 2, Activation::Relu, 1);
        let result = network.predict(&[1.0, 2.0]);
        assert!(matches!(result, Err(MoodError::InvalidInput(_))));
    }

    #[test]
    fn test_same_seed_same_weights() {
        let a = FeedForwardNetwork::new(3, &[4], 2, Activation::Tanh, 42);
        let b = FeedForwardNetwork::new(3, &[4], 2, Activation::Tanh, 42);
        assert_eq!(a.predict(&[0.1, 0.2, 0.3]).unwrap(), b.predict(&[0.1, 0.2, 0.3]).unwrap());
    }

    #[test]
    fn test_training_reduces_loss() {
        for activation in [Activation::Relu, Activation::Sigmoid, Activation::Tanh] {
            let mut network = FeedForwardNetwork::new(2, &[8], 2, activation, 3);
            let examples = xor_like_examples();
            let batch: Vec<&TrainingExample> = examples.iter().collect();

            let initial = network.train_batch(&batch, 0.0, 0.0);
            let mut last = initial;
            for _ in 0..2000 {
                last = network.train_batch(&batch, 0.05, 0.9);
            }
            assert!(last < initial, "{:?}: loss {} should drop below {}", activation, last, initial);
        }
    }

    #[test]
    fn test_input_importance_shape() {
        let network = FeedForwardNetwork::new(5, &[3, 2], 4, Activation::Relu, 9);
        let importance = network.input_importance();
        assert_eq!(importance.len(), 5);
        assert!(importance.iter().all(|v| *v >= 0.0));
        assert_eq!(network.output_size(), 4);
    }
}
