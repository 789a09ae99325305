use crate::tensor::OutputTensor;
use crate::tokenizer::{Vocabulary, EOS_TOKEN, PAD_TOKEN};

/// Greedy decoding: one token per row, chosen by arg-max.
///
/// Rows whose winning index has no token, and the reserved `<pad>`/`<eos>` tokens,
/// contribute nothing. Tokens are space-joined and the result trimmed.
pub fn decode(tensor: &OutputTensor, vocab: &Vocabulary) -> String {
    let mut out = String::new();
    for row in tensor.iter_rows() {
        let Some(idx) = argmax(row) else {
            continue;
        };
        let Ok(id) = i32::try_from(idx) else {
            continue;
        };
        match vocab.lookup_token(id) {
            Some(tok) if tok != PAD_TOKEN && tok != EOS_TOKEN => {
                out.push_str(tok);
                out.push(' ');
            }
            _ => {}
        }
    }
    out.trim().to_string()
}

/// Index of the largest score; the first occurrence wins ties. `None` for an
/// empty row.
pub fn argmax(row: &[f32]) -> Option<usize> {
    let (&first, rest) = row.split_first()?;
    let mut best = 0usize;
    let mut best_val = first;
    for (i, &v) in rest.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best = i + 1;
        }
    }
    Some(best)
}
