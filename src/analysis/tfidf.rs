//! TF-IDF 向量化与余弦相似度
//!
//! 分词：`\b\w\w+\b`，小写化；先去英文停用词，再组合 n-gram（1..=ngram_max）。
//! 词表按语料总词频截取前 max_features 个（同频按字典序），idf 取平滑形式
//! `ln((1 + n) / (1 + df)) + 1`，最后做 L2 归一化。

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// 向量化失败；总是被 ConvergenceScorer 捕获并转入信号回退
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VectorizeError {
    #[error("empty vocabulary; documents may only contain stop words")]
    EmptyVocabulary,

    #[error("tokenizer unavailable")]
    Tokenizer,
}

/// 向量化参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TfidfConfig {
    pub max_features: usize,
    pub ngram_max: usize,
    pub remove_stop_words: bool,
}

impl Default for TfidfConfig {
    fn default() -> Self {
        Self {
            max_features: 500,
            ngram_max: 2,
            remove_stop_words: true,
        }
    }
}

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all", "almost",
    "alone", "along", "already", "also", "although", "always", "am", "among", "amongst",
    "amoungst", "amount", "an", "and", "another", "any", "anyhow", "anyone", "anything",
    "anyway", "anywhere", "are", "around", "as", "at", "back", "be", "became", "because",
    "become", "becomes", "becoming", "been", "before", "beforehand", "behind", "being", "below",
    "beside", "besides", "between", "beyond", "bill", "both", "bottom", "but", "by", "call",
    "can", "cannot", "cant", "co", "con", "could", "couldnt", "cry", "de", "describe", "detail",
    "do", "done", "down", "due", "during", "each", "eg", "eight", "either", "eleven", "else",
    "elsewhere", "empty", "enough", "etc", "even", "ever", "every", "everyone", "everything",
    "everywhere", "except", "few", "fifteen", "fifty", "fill", "find", "fire", "first", "five",
    "for", "former", "formerly", "forty", "found", "four", "from", "front", "full", "further",
    "get", "give", "go", "had", "has", "hasnt", "have", "he", "hence", "her", "here",
    "hereafter", "hereby", "herein", "hereupon", "hers", "herself", "him", "himself", "his",
    "how", "however", "hundred", "i", "ie", "if", "in", "inc", "indeed", "interest", "into",
    "is", "it", "its", "itself", "keep", "last", "latter", "latterly", "least", "less", "ltd",
    "made", "many", "may", "me", "meanwhile", "might", "mill", "mine", "more", "moreover",
    "most", "mostly", "move", "much", "must", "my", "myself", "name", "namely", "neither",
    "never", "nevertheless", "next", "nine", "no", "nobody", "none", "noone", "nor", "not",
    "nothing", "now", "nowhere", "of", "off", "often", "on", "once", "one", "only", "onto",
    "or", "other", "others", "otherwise", "our", "ours", "ourselves", "out", "over", "own",
    "part", "per", "perhaps", "please", "put", "rather", "re", "same", "see", "seem", "seemed",
    "seeming", "seems", "serious", "several", "she", "should", "show", "side", "since",
    "sincere", "six", "sixty", "so", "some", "somehow", "someone", "something", "sometime",
    "sometimes", "somewhere", "still", "such", "system", "take", "ten", "than", "that", "the",
    "their", "them", "themselves", "then", "thence", "there", "thereafter", "thereby",
    "therefore", "therein", "thereupon", "these", "they", "thick", "thin", "third", "this",
    "those", "though", "three", "through", "throughout", "thru", "thus", "to", "together",
    "too", "top", "toward", "towards", "twelve", "twenty", "two", "un", "under", "until", "up",
    "upon", "us", "very", "via", "was", "we", "well", "were", "what", "whatever", "when",
    "whence", "whenever", "where", "whereafter", "whereas", "whereby", "wherein", "whereupon",
    "wherever", "whether", "which", "while", "whither", "who", "whoever", "whole", "whom",
    "whose", "why", "will", "with", "within", "without", "would", "yet", "you", "your", "yours",
    "yourself", "yourselves",
];

fn stop_words() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| ENGLISH_STOP_WORDS.iter().copied().collect())
}

fn token_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\w\w+\b").ok()).as_ref()
}

/// 稀疏向量：词表下标 -> 权重
pub type SparseVector = HashMap<usize, f64>;

/// 拟合后的 TF-IDF 模型
#[derive(Debug, Clone)]
pub struct TfidfVectorizer {
    config: TfidfConfig,
}

impl TfidfVectorizer {
    pub fn new(config: TfidfConfig) -> Self {
        Self { config }
    }

    fn analyze(&self, text: &str) -> Result<Vec<String>, VectorizeError> {
        let re = token_regex().ok_or(VectorizeError::Tokenizer)?;
        let lower = text.to_lowercase();
        let tokens: Vec<&str> = re
            .find_iter(&lower)
            .map(|m| m.as_str())
            .filter(|t| !self.config.remove_stop_words || !stop_words().contains(t))
            .collect();

        let mut terms = Vec::new();
        for n in 1..=self.config.ngram_max.max(1) {
            if tokens.len() < n {
                break;
            }
            terms.extend(tokens.windows(n).map(|w| w.join(" ")));
        }
        Ok(terms)
    }

    /// 拟合并变换；返回每篇文档的 L2 归一化向量
    pub fn fit_transform(&self, docs: &[&str]) -> Result<Vec<SparseVector>, VectorizeError> {
        if self.config.max_features == 0 {
            return Err(VectorizeError::EmptyVocabulary);
        }

        let analyzed = docs
            .iter()
            .map(|d| self.analyze(d))
            .collect::<Result<Vec<_>, _>>()?;

        // 语料总词频与文档频率
        let mut corpus_tf: BTreeMap<&str, usize> = BTreeMap::new();
        let mut df: HashMap<&str, usize> = HashMap::new();
        for terms in &analyzed {
            let mut seen = HashSet::new();
            for term in terms {
                *corpus_tf.entry(term.as_str()).or_default() += 1;
                if seen.insert(term.as_str()) {
                    *df.entry(term.as_str()).or_default() += 1;
                }
            }
        }
        if corpus_tf.is_empty() {
            return Err(VectorizeError::EmptyVocabulary);
        }

        // BTreeMap 已按字典序，稳定排序后同频保持字典序
        let mut ranked: Vec<(&str, usize)> = corpus_tf.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(self.config.max_features);
        let mut kept: Vec<&str> = ranked.into_iter().map(|(t, _)| t).collect();
        kept.sort_unstable();
        let vocab: HashMap<&str, usize> = kept.iter().enumerate().map(|(i, t)| (*t, i)).collect();

        let n = docs.len() as f64;
        let idf: Vec<f64> = kept
            .iter()
            .map(|t| {
                let d = df.get(t).copied().unwrap_or(0) as f64;
                ((1.0 + n) / (1.0 + d)).ln() + 1.0
            })
            .collect();

        let vectors = analyzed
            .iter()
            .map(|terms| {
                let mut v = SparseVector::new();
                for term in terms {
                    if let Some(&i) = vocab.get(term.as_str()) {
                        *v.entry(i).or_default() += 1.0;
                    }
                }
                for (i, w) in v.iter_mut() {
                    *w *= idf[*i];
                }
                let norm = v.values().map(|w| w * w).sum::<f64>().sqrt();
                if norm > 0.0 {
                    v.values_mut().for_each(|w| *w /= norm);
                }
                v
            })
            .collect();
        Ok(vectors)
    }
}

/// 两个已归一化向量的余弦相似度
pub fn cosine(a: &SparseVector, b: &SparseVector) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(i, w)| large.get(i).map(|x| w * x))
        .sum()
}

/// 完整相似度矩阵：对称，取值截断到 [0, 1]，对角线恒为 1.0
pub fn similarity_matrix(vectors: &[SparseVector]) -> Vec<Vec<f64>> {
    let n = vectors.len();
    let mut m = vec![vec![0.0; n]; n];
    for i in 0..n {
        m[i][i] = 1.0;
        for j in (i + 1)..n {
            let s = cosine(&vectors[i], &vectors[j]).clamp(0.0, 1.0);
            m[i][j] = s;
            m[j][i] = s;
        }
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_words_and_bigrams() {
        let v = TfidfVectorizer::new(TfidfConfig::default());
        let terms = v.analyze("The luminous core holds").unwrap();
        assert_eq!(terms, vec!["luminous", "core", "holds", "luminous core", "core holds"]);
    }

    #[test]
    fn test_identical_documents_fully_similar() {
        let v = TfidfVectorizer::new(TfidfConfig::default());
        let text = "concentric rings pulse around a bright center";
        let vectors = v.fit_transform(&[text, text, text]).unwrap();
        let m = similarity_matrix(&vectors);
        assert!(m[0][1] > 0.999);
        assert!(m[1][2] > 0.999);
    }

    #[test]
    fn test_matrix_symmetric_with_unit_diagonal() {
        let v = TfidfVectorizer::new(TfidfConfig::default());
        let vectors = v
            .fit_transform(&["rings widen slowly", "rings contract", "purple cats sleep"])
            .unwrap();
        let m = similarity_matrix(&vectors);
        for i in 0..3 {
            assert_eq!(m[i][i], 1.0);
            for j in 0..3 {
                assert_eq!(m[i][j], m[j][i]);
                assert!((0.0..=1.0).contains(&m[i][j]));
            }
        }
        assert!(m[0][1] > m[0][2]);
    }

    #[test]
    fn test_empty_vocabulary() {
        let v = TfidfVectorizer::new(TfidfConfig::default());
        assert_eq!(
            v.fit_transform(&["the and of", "a it is"]).unwrap_err(),
            VectorizeError::EmptyVocabulary
        );
        let v = TfidfVectorizer::new(TfidfConfig {
            max_features: 0,
            ..TfidfConfig::default()
        });
        assert_eq!(
            v.fit_transform(&["rings", "rings"]).unwrap_err(),
            VectorizeError::EmptyVocabulary
        );
    }

    #[test]
    fn test_max_features_caps_vocabulary() {
        let v = TfidfVectorizer::new(TfidfConfig {
            max_features: 1,
            ngram_max: 1,
            remove_stop_words: true,
        });
        let vectors = v.fit_transform(&["ring ring glow", "ring pulse"]).unwrap();
        assert!(vectors.iter().all(|x| x.len() == 1));
    }
}
