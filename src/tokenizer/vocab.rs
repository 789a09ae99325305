//! Token table loaded from the tokenizer configuration (`tokenizer.json`).

use std::collections::{BTreeMap, HashMap};

use encoding_rs::UTF_8;
use serde::Deserialize;

use crate::error::{PipelineError, Result};

pub const UNK_TOKEN: &str = "<unk>";
pub const PAD_TOKEN: &str = "<pad>";
pub const EOS_TOKEN: &str = "<eos>";

/// How to treat a configuration without a `model.vocab` table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VocabPolicy {
    /// Continue with an empty vocabulary (every word becomes `<unk>`).
    #[default]
    Lenient,
    /// Refuse to load.
    Strict,
}

impl VocabPolicy {
    pub fn parse(s: Option<&str>) -> Self {
        match s.unwrap_or("lenient").trim().to_ascii_lowercase().as_str() {
            "strict" => Self::Strict,
            _ => Self::Lenient,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenizerConfig {
    #[serde(default)]
    model: Option<ModelSection>,
}

#[derive(Debug, Deserialize)]
struct ModelSection {
    #[serde(default)]
    vocab: Option<BTreeMap<String, f64>>,
}

/// Bidirectional token table. Every id in the forward map resolves back to the
/// same token in the reverse map and vice versa.
#[derive(Clone, Debug, Default)]
pub struct Vocabulary {
    token_to_id: HashMap<String, i32>,
    id_to_token: HashMap<i32, String>,
    unk_id: i32,
    table_present: bool,
    skipped_duplicates: usize,
}

impl Vocabulary {
    pub fn load(bytes: &[u8], policy: VocabPolicy) -> Result<Self> {
        let (text, _had_errors) = UTF_8.decode_with_bom_removal(bytes);
        let cfg: TokenizerConfig = serde_json::from_str(&text)
            .map_err(|e| PipelineError::Config(format!("parse tokenizer json: {e}")))?;

        let table = cfg.model.and_then(|m| m.vocab);
        match table {
            Some(table) => Ok(Self::from_entries(
                table.into_iter().map(|(tok, v)| (tok, v as i32)),
            )),
            None if policy == VocabPolicy::Strict => Err(PipelineError::Config(
                "missing model.vocab table".to_string(),
            )),
            None => Ok(Self::default()),
        }
    }

    /// Builds both maps in one pass. When several tokens claim one id, the first
    /// one seen keeps it and the rest are skipped.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, i32)>,
        S: Into<String>,
    {
        let mut token_to_id = HashMap::new();
        let mut id_to_token = HashMap::new();
        let mut skipped_duplicates = 0usize;
        for (token, id) in entries {
            let token = token.into();
            if id_to_token.contains_key(&id) || token_to_id.contains_key(&token) {
                skipped_duplicates += 1;
                continue;
            }
            id_to_token.insert(id, token.clone());
            token_to_id.insert(token, id);
        }
        let unk_id = token_to_id.get(UNK_TOKEN).copied().unwrap_or(0);
        Self {
            token_to_id,
            id_to_token,
            unk_id,
            table_present: true,
            skipped_duplicates,
        }
    }

    pub fn lookup_id(&self, token: &str) -> Option<i32> {
        self.token_to_id.get(token).copied()
    }

    /// Id of `token`, or the `<unk>` id when the token is not in the table.
    pub fn id_or_unk(&self, token: &str) -> i32 {
        self.lookup_id(token).unwrap_or(self.unk_id)
    }

    pub fn lookup_token(&self, id: i32) -> Option<&str> {
        self.id_to_token.get(&id).map(String::as_str)
    }

    pub fn unk_id(&self) -> i32 {
        self.unk_id
    }

    pub fn len(&self) -> usize {
        self.token_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_to_id.is_empty()
    }

    /// False when the configuration had no token table and the lenient policy
    /// produced an empty vocabulary.
    pub fn table_present(&self) -> bool {
        self.table_present
    }

    pub fn skipped_duplicates(&self) -> usize {
        self.skipped_duplicates
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> + '_ {
        self.token_to_id.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::{PipelineError, VocabPolicy, Vocabulary};

    const CFG: &str = r#"{"version":"1.0","model":{"type":"BPE","vocab":{"<unk>":0,"<pad>":1,"hello":5.0,"world":6.9}}}"#;

    #[test]
    fn load_truncates_numeric_ids() {
        let v = Vocabulary::load(CFG.as_bytes(), VocabPolicy::Lenient).expect("load");
        assert_eq!(v.len(), 4);
        assert_eq!(v.lookup_id("hello"), Some(5));
        assert_eq!(v.lookup_id("world"), Some(6));
        assert_eq!(v.lookup_token(6), Some("world"));
        assert!(v.table_present());
    }

    #[test]
    fn forward_and_reverse_round_trip() {
        let v = Vocabulary::load(CFG.as_bytes(), VocabPolicy::Lenient).expect("load");
        for tok in v.tokens() {
            let id = v.lookup_id(tok).expect("id");
            assert_eq!(v.lookup_token(id), Some(tok));
        }
    }

    #[test]
    fn bom_prefixed_payload_parses() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(CFG.as_bytes());
        let v = Vocabulary::load(&bytes, VocabPolicy::Strict).expect("load");
        assert_eq!(v.lookup_id("<pad>"), Some(1));
    }

    #[test]
    fn missing_table_depends_on_policy() {
        let cfg = br#"{"model":{"type":"BPE"}}"#;
        let v = Vocabulary::load(cfg, VocabPolicy::Lenient).expect("lenient");
        assert!(v.is_empty());
        assert!(!v.table_present());
        assert_eq!(v.unk_id(), 0);

        let err = Vocabulary::load(cfg, VocabPolicy::Strict).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn malformed_json_is_config_error() {
        for bad in [&b"{not json"[..], br#"{"model":{"vocab":{"a":"x"}}}"#, b"[1,2]"] {
            let err = Vocabulary::load(bad, VocabPolicy::Lenient).unwrap_err();
            assert!(matches!(err, PipelineError::Config(_)), "{err}");
        }
    }

    #[test]
    fn duplicate_ids_keep_first_token() {
        let v = Vocabulary::from_entries([("a", 1), ("b", 1), ("c", 2)]);
        assert_eq!(v.lookup_token(1), Some("a"));
        assert_eq!(v.lookup_id("b"), None);
        assert_eq!(v.skipped_duplicates(), 1);
        assert_eq!(v.len(), 2);
    }

    #[test]
    fn unk_id_follows_table() {
        let v = Vocabulary::from_entries([("<unk>", 3), ("x", 4)]);
        assert_eq!(v.id_or_unk("missing"), 3);
        let v = Vocabulary::from_entries([("x", 4)]);
        assert_eq!(v.id_or_unk("missing"), 0);
    }
}
