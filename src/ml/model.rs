use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    pub vocab_size:  usize,
    pub max_seq_len: usize,
    pub d_model:     usize,
    pub num_heads:   usize,
    pub num_layers:  usize,
    pub d_ff:        usize,
    pub dropout:     f64,
    #[config(default = 2)]
    pub num_classes: usize,
    /// Decoder blocks reading the encoder output; 0 = encoder-only.
    #[config(default = 0)]
    pub num_decoder_layers: usize,
}

impl ClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> TransformerClassifier<B> {
        let token_embedding    = EmbeddingConfig::new(self.vocab_size, self.d_model).init(device);
        let position_embedding = EmbeddingConfig::new(self.max_seq_len, self.d_model).init(device);
        let encoder: Vec<EncoderBlock<B>> = (0..self.num_layers)
            .map(|_| self.build_encoder_block(device))
            .collect();
        let decoder: Vec<DecoderBlock<B>> = (0..self.num_decoder_layers)
            .map(|_| self.build_decoder_block(device))
            .collect();
        let query      = EmbeddingConfig::new(1, self.d_model).init(device);
        let final_norm = LayerNormConfig::new(self.d_model).init(device);
        let head       = LinearConfig::new(self.d_model, self.num_classes).init(device);
        let dropout    = DropoutConfig::new(self.dropout).init();
        TransformerClassifier {
            token_embedding, position_embedding, encoder, decoder,
            query, final_norm, head, dropout,
            max_seq_len: self.max_seq_len,
        }
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        let self_attn   = MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
            .with_dropout(self.dropout)
            .init(device);
        let ffn_linear1 = LinearConfig::new(self.d_model, self.d_ff).init(device);
        let ffn_linear2 = LinearConfig::new(self.d_ff, self.d_model).init(device);
        let norm1   = LayerNormConfig::new(self.d_model).init(device);
        let norm2   = LayerNormConfig::new(self.d_model).init(device);
        let dropout = DropoutConfig::new(self.dropout).init();
        EncoderBlock { self_attn, ffn_linear1, ffn_linear2, norm1, norm2, dropout }
    }

    fn build_decoder_block<B: Backend>(&self, device: &B::Device) -> DecoderBlock<B> {
        let cross_attn  = MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
            .with_dropout(self.dropout)
            .init(device);
        let ffn_linear1 = LinearConfig::new(self.d_model, self.d_ff).init(device);
        let ffn_linear2 = LinearConfig::new(self.d_ff, self.d_model).init(device);
        let norm1   = LayerNormConfig::new(self.d_model).init(device);
        let norm2   = LayerNormConfig::new(self.d_model).init(device);
        let dropout = DropoutConfig::new(self.dropout).init();
        DecoderBlock { cross_attn, ffn_linear1, ffn_linear2, norm1, norm2, dropout }
    }
}

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    /// pad_mask: [batch, seq_len], true at padding positions
    pub fn forward(&self, x: Tensor<B, 3>, pad_mask: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let attn_output = self
            .self_attn
            .forward(MhaInput::self_attn(x.clone()).mask_pad(pad_mask))
            .context;
        let x = self.norm1.forward(x + self.dropout.forward(attn_output));
        let ffn_out = self.ffn_linear2.forward(
            burn::tensor::activation::gelu(self.ffn_linear1.forward(x.clone()))
        );
        self.norm2.forward(x + self.dropout.forward(ffn_out))
    }
}

/// A single learned query attending over the encoder output.
#[derive(Module, Debug)]
pub struct DecoderBlock<B: Backend> {
    pub cross_attn:  MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> DecoderBlock<B> {
    pub fn forward(
        &self,
        query:    Tensor<B, 3>,
        memory:   Tensor<B, 3>,
        pad_mask: Tensor<B, 2, Bool>,
    ) -> Tensor<B, 3> {
        let attn_output = self
            .cross_attn
            .forward(MhaInput::new(query.clone(), memory.clone(), memory).mask_pad(pad_mask))
            .context;
        let x = self.norm1.forward(query + self.dropout.forward(attn_output));
        let ffn_out = self.ffn_linear2.forward(
            burn::tensor::activation::gelu(self.ffn_linear1.forward(x.clone()))
        );
        self.norm2.forward(x + self.dropout.forward(ffn_out))
    }
}

#[derive(Module, Debug)]
pub struct TransformerClassifier<B: Backend> {
    pub token_embedding:    Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub encoder:            Vec<EncoderBlock<B>>,
    pub decoder:            Vec<DecoderBlock<B>>,
    pub query:              Embedding<B>,
    pub final_norm:         LayerNorm<B>,
    pub head:               Linear<B>,
    pub dropout:            Dropout,
    pub max_seq_len:        usize,
}

/// Output of a forward pass that also exposes one intermediate layer.
pub struct HiddenOutput<B: Backend> {
    /// Embedding layer output — [batch, seq_len, d_model]
    pub embeddings: Tensor<B, 3>,
    /// Pooled representation of the requested layer — [batch, d_model]
    pub hidden: Tensor<B, 2>,
    /// Class logits — [batch, num_classes]
    pub logits: Tensor<B, 2>,
}

impl<B: Backend> TransformerClassifier<B> {
    /// Number of layers whose output can be used as hidden state:
    /// the embedding output, every encoder block, every decoder block.
    pub fn num_hidden_layers(&self) -> usize {
        1 + self.encoder.len() + self.decoder.len()
    }

    /// input_ids: [batch, seq_len] → token + position embeddings [batch, seq_len, d_model]
    pub fn embed(&self, input_ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let [batch_size, seq_len] = input_ids.dims();

        let tok_emb = self.token_embedding.forward(input_ids);

        // Self-attention is permutation-invariant, so position must be injected explicitly.
        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &tok_emb.device())
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);
        let pos_emb = self.position_embedding.forward(positions);

        self.dropout.forward(tok_emb + pos_emb)
    }

    /// Plain classification: [batch, seq_len] → logits [batch, num_classes]
    pub fn forward(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
    ) -> Tensor<B, 2> {
        let last = self.num_hidden_layers() - 1;
        self.forward_with_layer(input_ids, attention_mask, last).logits
    }

    pub fn forward_with_layer(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
        layer:          usize,
    ) -> HiddenOutput<B> {
        let embeddings = self.embed(input_ids);
        let (hidden, logits) = self.forward_embeddings(embeddings.clone(), attention_mask, layer);
        HiddenOutput { embeddings, hidden, logits }
    }

    /// Run the network from an embedding tensor (possibly perturbed).
    /// Returns (pooled hidden state of `layer`, logits).
    pub fn forward_embeddings(
        &self,
        embeddings:     Tensor<B, 3>,
        attention_mask: Tensor<B, 2, Int>,
        layer:          usize,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let pad_mask = attention_mask.clone().equal_elem(0);

        let mut selected = (layer == 0).then(|| masked_mean(embeddings.clone(), attention_mask.clone()));

        let mut x = embeddings;
        for (i, block) in self.encoder.iter().enumerate() {
            x = block.forward(x, pad_mask.clone());
            if layer == i + 1 {
                selected = Some(masked_mean(x.clone(), attention_mask.clone()));
            }
        }
        let x = self.final_norm.forward(x); // [batch, seq_len, d_model]

        let pooled = if self.decoder.is_empty() {
            masked_mean(x, attention_mask)
        } else {
            let [batch_size, _, d_model] = x.dims();
            let query_ids = Tensor::<B, 2, Int>::zeros([batch_size, 1], &x.device());
            let mut q = self.query.forward(query_ids); // [batch, 1, d_model]
            let offset = 1 + self.encoder.len();
            for (j, block) in self.decoder.iter().enumerate() {
                q = block.forward(q, x.clone(), pad_mask.clone());
                if layer == offset + j {
                    selected = Some(q.clone().reshape([batch_size, d_model]));
                }
            }
            q.reshape([batch_size, d_model])
        };

        let logits = self.head.forward(self.dropout.forward(pooled.clone()));
        (selected.unwrap_or(pooled), logits)
    }
}

/// Mean over the attended positions of each sequence.
/// x: [batch, seq_len, d_model], attention_mask: [batch, seq_len] → [batch, d_model]
pub fn masked_mean<B: Backend>(x: Tensor<B, 3>, attention_mask: Tensor<B, 2, Int>) -> Tensor<B, 2> {
    let [batch_size, seq_len, d_model] = x.dims();
    let weights = attention_mask.float().reshape([batch_size, seq_len, 1]);
    let summed = (x * weights.clone().expand([batch_size, seq_len, d_model]))
        .sum_dim(1)
        .reshape([batch_size, d_model]);
    let counts = weights.sum_dim(1).reshape([batch_size, 1]).clamp_min(1.0);
    summed / counts.expand([batch_size, d_model])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::test_support::{tiny_config, TestBackend};

    #[test]
    fn test_forward_shapes() {
        let device = Default::default();
        let model: TransformerClassifier<TestBackend> = tiny_config().init(&device);

        let ids  = Tensor::<TestBackend, 2, Int>::from_ints([[3, 4, 5, 0], [6, 7, 0, 0]], &device);
        let mask = Tensor::<TestBackend, 2, Int>::from_ints([[1, 1, 1, 0], [1, 1, 0, 0]], &device);

        let out = model.forward_with_layer(ids, mask, 1);
        assert_eq!(out.embeddings.dims(), [2, 4, 16]);
        assert_eq!(out.hidden.dims(), [2, 16]);
        assert_eq!(out.logits.dims(), [2, 2]);
    }

    #[test]
    fn test_hidden_layer_count_includes_decoder() {
        let device = Default::default();
        let enc: TransformerClassifier<TestBackend> = tiny_config().init(&device);
        let ed: TransformerClassifier<TestBackend> =
            tiny_config().with_num_decoder_layers(1).init(&device);

        assert_eq!(enc.num_hidden_layers(), 3);
        assert_eq!(ed.num_hidden_layers(), 4);

        let ids  = Tensor::<TestBackend, 2, Int>::from_ints([[3, 4, 0]], &device);
        let mask = Tensor::<TestBackend, 2, Int>::from_ints([[1, 1, 0]], &device);
        let out = ed.forward_with_layer(ids, mask, 3);
        assert_eq!(out.hidden.dims(), [1, 16]);
        assert_eq!(out.logits.dims(), [1, 2]);
    }

    #[test]
    fn test_masked_mean_ignores_padding() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 3>::from_floats(
            [[[1.0, 2.0], [3.0, 4.0], [100.0, 100.0]]],
            &device,
        );
        let mask = Tensor::<TestBackend, 2, Int>::from_ints([[1, 1, 0]], &device);

        let pooled: Vec<f32> = masked_mean(x, mask).into_data().to_vec::<f32>().unwrap();
        assert_eq!(pooled, vec![2.0, 3.0]);
    }
}
