//! Exam assembler.
//!
//! Decides between the template path and the externally generated path,
//! splits the requested count across topics, reuses cached batches, falls back
//! to templates per topic when the external capability fails, filters repeats
//! by signature, and backfills to the exact requested size.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::cache::{cache_key, BatchStore};
use crate::error::ExamError;
use crate::ids::make_id;
use crate::model::{BatchMode, Difficulty, ExamBatch, ExamRequest, Question, LABELS};
use crate::templates::generate_question;
use crate::traits::{QuestionGenerator, QuestionRequest, RawQuestion, TRACE_TARGET};

/// Attempts per requested question on the template path before giving up.
const DETERMINISTIC_ATTEMPT_FACTOR: usize = 3;

/// Builds exam batches.
///
/// The generator is optional: without one (no credential configured) every
/// request is served from templates.
pub struct ExamAssembler {
    generator: Option<Arc<dyn QuestionGenerator>>,
    store: Arc<dyn BatchStore>,
    rng: Mutex<StdRng>,
}

/// Running state of one batch being filled.
struct Collector {
    questions: Vec<Question>,
    seen: HashSet<String>,
    target: usize,
    avoid_repeat: bool,
}

impl Collector {
    fn new(target: usize, avoid_repeat: bool) -> Self {
        Self {
            questions: Vec::with_capacity(target),
            seen: HashSet::new(),
            target,
            avoid_repeat,
        }
    }

    fn is_full(&self) -> bool {
        self.questions.len() >= self.target
    }

    /// Add a question unless the batch is full or it repeats a signature.
    fn offer(&mut self, question: Question) -> bool {
        if self.is_full() {
            return false;
        }
        let fresh = self.seen.insert(question.signature());
        if self.avoid_repeat && !fresh {
            return false;
        }
        self.questions.push(question);
        true
    }

    fn finish(mut self, mode: BatchMode) -> ExamBatch {
        self.questions.truncate(self.target);
        let shortfall = self.target - self.questions.len();
        if shortfall > 0 {
            tracing::warn!(
                target: TRACE_TARGET,
                "[question_gen][shortfall] requested={} produced={}",
                self.target,
                self.questions.len()
            );
        }
        ExamBatch {
            questions: self.questions,
            mode,
            shortfall,
        }
    }
}

impl ExamAssembler {
    pub fn new(generator: Option<Arc<dyn QuestionGenerator>>, store: Arc<dyn BatchStore>) -> Self {
        Self {
            generator,
            store,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Replace the randomness source with a seeded one, for reproducible output.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Whether requests for an AI mode will actually reach the generator.
    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }

    fn template_question(&self, topic: &str) -> Question {
        self.with_rng(|rng| generate_question(topic, rng))
    }

    fn random_topic_question(&self, topics: &[String]) -> Question {
        self.with_rng(|rng| {
            let topic = topics.choose(rng).map(String::as_str).unwrap_or_default();
            generate_question(topic, rng)
        })
    }

    /// Produce a batch of exactly `request.num_questions` questions (or fewer,
    /// flagged by `shortfall`, if the template path runs out of attempts).
    pub async fn generate_exam(&self, request: &ExamRequest) -> Result<ExamBatch, ExamError> {
        if request.num_questions == 0 {
            return Err(ExamError::InvalidRequest(
                "num_questions must be at least 1".into(),
            ));
        }
        let topics = request.normalized_topics();

        if request.mode.wants_external() {
            match &self.generator {
                Some(generator) => {
                    return Ok(self
                        .generate_external(generator.as_ref(), &topics, request)
                        .await)
                }
                None => tracing::info!(
                    target: TRACE_TARGET,
                    "[question_gen][fallback] no API key; using deterministic generator"
                ),
            }
        }

        Ok(self.generate_deterministic(&topics, request))
    }

    fn generate_deterministic(&self, topics: &[String], request: &ExamRequest) -> ExamBatch {
        let mut collector = Collector::new(request.num_questions, request.avoid_repeat);
        for _ in 0..request.num_questions * DETERMINISTIC_ATTEMPT_FACTOR {
            if collector.is_full() {
                break;
            }
            collector.offer(self.random_topic_question(topics));
        }
        collector.finish(BatchMode::Deterministic)
    }

    async fn generate_external(
        &self,
        generator: &dyn QuestionGenerator,
        topics: &[String],
        request: &ExamRequest,
    ) -> ExamBatch {
        let quotas = self.with_rng(|rng| topic_quotas(topics, request.num_questions, rng));
        let mut collector = Collector::new(request.num_questions, request.avoid_repeat);

        for (topic, quota) in topics.iter().zip(quotas) {
            if quota == 0 {
                continue;
            }
            let batch = self
                .topic_batch(generator, topic, request.difficulty, quota)
                .await;
            for question in batch {
                if collector.is_full() {
                    break;
                }
                collector.offer(question);
            }
        }

        while !collector.is_full() {
            collector.offer(self.random_topic_question(topics));
        }
        collector.finish(BatchMode::Ai)
    }

    /// One topic's questions: from cache, from the generator, or from templates.
    async fn topic_batch(
        &self,
        generator: &dyn QuestionGenerator,
        topic: &str,
        difficulty: Difficulty,
        quota: usize,
    ) -> Vec<Question> {
        let key = cache_key(topic, difficulty, quota);

        if let Some(cached) = self.store.get(&key) {
            if cached.len() < quota {
                tracing::debug!("dropping short cache entry {key} ({} < {quota})", cached.len());
                self.store.remove(&key);
            } else if cached.iter().all(|q| q.topic == topic) {
                tracing::debug!("cache hit for {key}");
                return cached;
            }
        }

        let request = QuestionRequest {
            topic: topic.to_string(),
            difficulty,
            count: quota,
        };
        match generator.generate_questions(&request).await {
            Ok(raw) => {
                let Sanitized {
                    questions,
                    mismatched,
                    incomplete,
                } = self.with_rng(|rng| sanitize_batch(raw, topic, quota, rng));
                if mismatched > 0 || incomplete > 0 {
                    tracing::warn!(
                        target: TRACE_TARGET,
                        "[question_gen][discarded] topic={topic} mismatched={mismatched} \
                         incomplete={incomplete}; not caching"
                    );
                } else if !questions.is_empty() {
                    self.store.set(&key, questions.clone());
                }
                questions
            }
            Err(e) => {
                tracing::warn!(
                    target: TRACE_TARGET,
                    "[question_gen][fallback] topic={topic} reason={}: {e}",
                    e.kind()
                );
                (0..quota).map(|_| self.template_question(topic)).collect()
            }
        }
    }
}

/// Split `total` across topics: an even floor share each, plus one extra for
/// `total % topics.len()` topics chosen at random without replacement.
pub fn topic_quotas<R: rand::Rng + ?Sized>(
    topics: &[String],
    total: usize,
    rng: &mut R,
) -> Vec<usize> {
    if topics.is_empty() {
        return Vec::new();
    }
    let base = total / topics.len();
    let remainder = total % topics.len();
    let mut quotas = vec![base; topics.len()];
    for idx in rand::seq::index::sample(rng, topics.len(), remainder) {
        quotas[idx] += 1;
    }
    quotas
}

/// Outcome of sanitizing one external batch.
#[derive(Debug, Default)]
pub struct Sanitized {
    pub questions: Vec<Question>,
    /// Items that named a different topic.
    pub mismatched: usize,
    /// Items with fewer than four options.
    pub incomplete: usize,
}

/// Coerce external items into canonical questions.
///
/// Missing ids are generated and option values are stringified. Options
/// labeled `A`-`D` keep their labels (extra labels are dropped); otherwise the
/// first four options are relabeled `A`-`D` in order and the answer follows its
/// option. An answer that names no kept option becomes `A`. Items naming
/// another topic, or carrying fewer than four options, are discarded and
/// counted.
pub fn sanitize_batch<R: rand::Rng + ?Sized>(
    raw: Vec<RawQuestion>,
    topic: &str,
    limit: usize,
    rng: &mut R,
) -> Sanitized {
    let mut out = Sanitized {
        questions: Vec::with_capacity(raw.len().min(limit)),
        ..Sanitized::default()
    };

    for item in raw.into_iter().take(limit) {
        let item_topic = item
            .topic
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| topic.to_string());
        if item_topic != topic {
            out.mismatched += 1;
            continue;
        }

        let entries: Vec<(String, String)> = item
            .options
            .unwrap_or_default()
            .into_iter()
            .map(|(label, value)| {
                let text = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (label.trim().to_string(), text)
            })
            .collect();
        if entries.len() < LABELS.len() {
            out.incomplete += 1;
            continue;
        }

        let answer = item
            .answer
            .or(item.correct)
            .map(|a| a.trim().to_string())
            .unwrap_or_default();
        let (options, answer) = relabel_options(entries, &answer);

        out.questions.push(Question {
            id: item
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| make_id(rng)),
            topic: item_topic,
            question: item.question.unwrap_or_default(),
            options,
            answer,
        });
    }

    out
}

/// Map at least four option entries onto exactly the labels `A`-`D`.
fn relabel_options(
    entries: Vec<(String, String)>,
    answer: &str,
) -> (BTreeMap<String, String>, String) {
    let canonical = LABELS
        .iter()
        .all(|label| entries.iter().any(|(key, _)| key == label));

    if canonical {
        let options: BTreeMap<String, String> = entries
            .into_iter()
            .filter(|(key, _)| LABELS.contains(&key.as_str()))
            .collect();
        let upper = answer.to_uppercase();
        let answer = if LABELS.contains(&upper.as_str()) {
            upper
        } else {
            LABELS[0].to_string()
        };
        return (options, answer);
    }

    let position = entries
        .iter()
        .take(LABELS.len())
        .position(|(key, _)| key == answer)
        .unwrap_or(0);
    let options = LABELS
        .iter()
        .zip(entries)
        .map(|(label, (_, text))| (label.to_string(), text))
        .collect();
    (options, LABELS[position].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use crate::cache::MemoryStore;
    use crate::error::ProviderError;
    use crate::model::ExamMode;

    /// Echoes well-formed questions for whatever topic is asked.
    struct EchoGenerator {
        calls: AtomicU32,
        fail: bool,
        wrong_topic: bool,
    }

    impl EchoGenerator {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail: false,
                wrong_topic: false,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl QuestionGenerator for EchoGenerator {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate_questions(
            &self,
            request: &QuestionRequest,
        ) -> Result<Vec<RawQuestion>, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                return Err(ProviderError::NetworkError("connection refused".into()));
            }
            Ok((0..request.count)
                .map(|i| {
                    let mut options = serde_json::Map::new();
                    for (j, label) in LABELS.iter().enumerate() {
                        options.insert(label.to_string(), serde_json::json!(j));
                    }
                    RawQuestion {
                        id: Some(format!("ext_{n}_{i}")),
                        topic: Some(if self.wrong_topic {
                            "Other".into()
                        } else {
                            request.topic.clone()
                        }),
                        question: Some(format!("{} question {i}", request.topic)),
                        options: Some(options),
                        answer: Some("C".into()),
                        correct: None,
                    }
                })
                .collect())
        }
    }

    fn ai_request(topics: &[&str], n: usize) -> ExamRequest {
        ExamRequest {
            topics: topics.iter().map(|t| t.to_string()).collect(),
            num_questions: n,
            mode: ExamMode::Ai,
            ..Default::default()
        }
    }

    fn assembler(
        generator: Option<Arc<dyn QuestionGenerator>>,
    ) -> (Arc<MemoryStore>, ExamAssembler) {
        let store = Arc::new(MemoryStore::new());
        let assembler = ExamAssembler::new(generator, store.clone()).with_seed(17);
        (store, assembler)
    }

    #[tokio::test]
    async fn deterministic_single_topic() {
        let (_, assembler) = assembler(None);
        let request = ExamRequest {
            topics: vec!["Algebra".into()],
            num_questions: 10,
            ..Default::default()
        };
        let batch = assembler.generate_exam(&request).await.unwrap();
        assert_eq!(batch.mode, BatchMode::Deterministic);
        assert_eq!(batch.questions.len(), 10);
        assert_eq!(batch.shortfall, 0);
        assert!(batch.questions.iter().all(|q| q.topic == "Algebra"));
    }

    #[tokio::test]
    async fn signatures_are_unique() {
        let (_, assembler) = assembler(None);
        let request = ExamRequest {
            num_questions: 40,
            ..Default::default()
        };
        let batch = assembler.generate_exam(&request).await.unwrap();
        let sigs: HashSet<String> = batch.questions.iter().map(Question::signature).collect();
        assert_eq!(sigs.len(), 40);
    }

    #[tokio::test]
    async fn zero_questions_is_rejected() {
        let (_, assembler) = assembler(None);
        let request = ExamRequest {
            num_questions: 0,
            ..Default::default()
        };
        assert!(matches!(
            assembler.generate_exam(&request).await,
            Err(ExamError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn ai_mode_without_generator_downgrades() {
        let (_, assembler) = assembler(None);
        let batch = assembler
            .generate_exam(&ai_request(&["Geometry"], 5))
            .await
            .unwrap();
        assert_eq!(batch.mode, BatchMode::Deterministic);
        assert_eq!(batch.questions.len(), 5);
    }

    #[tokio::test]
    async fn quotas_are_balanced() {
        let generator = Arc::new(EchoGenerator::new());
        let (_, assembler) = assembler(Some(generator.clone()));
        let batch = assembler
            .generate_exam(&ai_request(&["A", "B", "C"], 10))
            .await
            .unwrap();

        assert_eq!(batch.mode, BatchMode::Ai);
        assert_eq!(batch.questions.len(), 10);
        let counts: BTreeMap<String, usize> = batch.topic_counts();
        assert_eq!(counts.values().sum::<usize>(), 10);
        let max = counts.values().max().unwrap();
        let min = counts.values().min().unwrap();
        assert!(max - min <= 1, "{counts:?}");
        assert_eq!(generator.calls(), 3);
    }

    #[tokio::test]
    async fn second_call_reuses_cache() {
        let generator = Arc::new(EchoGenerator::new());
        let (store, assembler) = assembler(Some(generator.clone()));
        let request = ai_request(&["Algebra", "Geometry"], 4);

        assembler.generate_exam(&request).await.unwrap();
        assert_eq!(generator.calls(), 2);
        assert_eq!(store.len(), 2);

        let batch = assembler.generate_exam(&request).await.unwrap();
        assert_eq!(generator.calls(), 2);
        assert_eq!(batch.questions.len(), 4);
    }

    #[tokio::test]
    async fn short_cache_entry_is_regenerated() {
        let generator = Arc::new(EchoGenerator::new());
        let (store, assembler) = assembler(Some(generator.clone()));
        let mut rng = StdRng::seed_from_u64(1);
        store.set(
            &cache_key("Algebra", Difficulty::Medium, 3),
            vec![generate_question("Algebra", &mut rng)],
        );

        assembler
            .generate_exam(&ai_request(&["Algebra"], 3))
            .await
            .unwrap();
        assert_eq!(generator.calls(), 1);
        assert_eq!(
            store
                .get(&cache_key("Algebra", Difficulty::Medium, 3))
                .unwrap()
                .len(),
            3
        );
    }

    #[tokio::test]
    async fn generator_failure_falls_back_per_topic() {
        let generator = Arc::new(EchoGenerator {
            fail: true,
            ..EchoGenerator::new()
        });
        let (store, assembler) = assembler(Some(generator.clone()));
        let batch = assembler
            .generate_exam(&ai_request(&["Algebra", "Derivatives"], 7))
            .await
            .unwrap();

        assert_eq!(batch.mode, BatchMode::Ai);
        assert_eq!(batch.questions.len(), 7);
        assert!(batch.questions.iter().all(|q| q.id.starts_with("q_")));
        assert!(store.is_empty());
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn mismatched_topics_are_discarded_and_backfilled() {
        let generator = Arc::new(EchoGenerator {
            wrong_topic: true,
            ..EchoGenerator::new()
        });
        let (store, assembler) = assembler(Some(generator));
        let batch = assembler
            .generate_exam(&ai_request(&["Functions"], 4))
            .await
            .unwrap();

        assert_eq!(batch.questions.len(), 4);
        assert!(batch.questions.iter().all(|q| q.topic == "Functions"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn fewer_questions_than_topics() {
        let generator = Arc::new(EchoGenerator::new());
        let (_, assembler) = assembler(Some(generator.clone()));
        let batch = assembler
            .generate_exam(&ai_request(&["A", "B", "C", "D", "E"], 2))
            .await
            .unwrap();
        assert_eq!(batch.questions.len(), 2);
        assert_eq!(generator.calls(), 2);
    }

    #[test]
    fn quota_split() {
        let topics: Vec<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        let mut rng = StdRng::seed_from_u64(0);
        let quotas = topic_quotas(&topics, 10, &mut rng);
        assert_eq!(quotas.iter().sum::<usize>(), 10);
        assert_eq!(quotas.iter().filter(|&&q| q == 4).count(), 1);

        assert_eq!(topic_quotas(&topics, 9, &mut rng), vec![3, 3, 3]);
        assert!(topic_quotas(&[], 9, &mut rng).is_empty());
    }

    fn four_options(values: [&str; 4]) -> serde_json::Map<String, serde_json::Value> {
        LABELS
            .iter()
            .zip(values)
            .map(|(label, value)| (label.to_string(), serde_json::json!(value)))
            .collect()
    }

    #[test]
    fn sanitize_defaults() {
        let mut options = four_options(["1", "2", "3", "4"]);
        options.insert("E".into(), serde_json::json!("5"));
        let raw = vec![
            RawQuestion {
                question: Some("pick".into()),
                options: Some(options),
                answer: Some("Z".into()),
                ..Default::default()
            },
            RawQuestion {
                id: Some("keep-me".into()),
                options: Some(four_options(["w", "x", "y", "z"])),
                correct: Some("d".into()),
                ..Default::default()
            },
            RawQuestion {
                topic: Some("Elsewhere".into()),
                ..Default::default()
            },
        ];
        let mut rng = StdRng::seed_from_u64(2);
        let out = sanitize_batch(raw, "Algebra", 10, &mut rng);

        assert_eq!(out.mismatched, 1);
        assert_eq!(out.incomplete, 0);
        let questions = out.questions;
        assert_eq!(questions.len(), 2);
        assert!(questions[0].id.starts_with("q_"));
        assert_eq!(questions[0].options.len(), 4);
        assert!(!questions[0].options.contains_key("E"));
        assert_eq!(questions[0].answer, "A");
        assert_eq!(questions[0].topic, "Algebra");
        assert_eq!(questions[1].id, "keep-me");
        assert_eq!(questions[1].answer, "D");
    }

    #[test]
    fn numeric_fields_survive_parsing_and_sanitizing() {
        let body = r#"{"questions": [
            {"id": "good", "topic": "Algebra", "question": "1+1?",
             "options": {"A": "2", "B": "3", "C": "4", "D": "5"}, "answer": "A"},
            {"id": 7, "topic": "Algebra", "question": "2+2?",
             "options": {"A": 4, "B": 5, "C": 6, "D": 7}, "answer": 2}
        ]}"#;
        let raw = crate::traits::parse_question_payload(body).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let out = sanitize_batch(raw, "Algebra", 5, &mut rng);

        assert_eq!(out.questions.len(), 2);
        assert_eq!(out.questions[0].id, "good");
        assert_eq!(out.questions[1].id, "7");
        assert_eq!(out.questions[1].answer, "A");
        assert_eq!(out.questions[1].option_text("A"), "4");
    }

    #[test]
    fn foreign_labels_are_relabeled() {
        let options: serde_json::Map<String, serde_json::Value> =
            [("1", "ten"), ("2", "eleven"), ("3", "twelve"), ("4", "thirteen"), ("5", "x")]
                .iter()
                .map(|(k, v)| (k.to_string(), serde_json::json!(v)))
                .collect();
        let raw = vec![
            RawQuestion {
                options: Some(options.clone()),
                answer: Some("3".into()),
                ..Default::default()
            },
            RawQuestion {
                options: Some(options),
                answer: Some("5".into()),
                ..Default::default()
            },
        ];
        let mut rng = StdRng::seed_from_u64(4);
        let questions = sanitize_batch(raw, "Algebra", 5, &mut rng).questions;

        let labels: Vec<&str> = questions[0].options.keys().map(String::as_str).collect();
        assert_eq!(labels, LABELS);
        assert_eq!(questions[0].answer, "C");
        assert_eq!(questions[0].option_text("C"), "twelve");
        assert_eq!(questions[1].answer, "A");
        for q in &questions {
            assert!(q.options.contains_key(&q.answer));
        }
    }

    #[test]
    fn items_with_too_few_options_are_dropped() {
        let mut three = four_options(["1", "2", "3", "4"]);
        three.remove("D");
        let raw = vec![
            RawQuestion {
                options: Some(three),
                answer: Some("D".into()),
                ..Default::default()
            },
            RawQuestion::default(),
        ];
        let mut rng = StdRng::seed_from_u64(5);
        let out = sanitize_batch(raw, "Algebra", 5, &mut rng);
        assert!(out.questions.is_empty());
        assert_eq!(out.incomplete, 2);
    }

    #[test]
    fn sanitize_respects_limit() {
        let item = RawQuestion {
            options: Some(four_options(["1", "2", "3", "4"])),
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(2);
        let out = sanitize_batch(vec![item; 5], "Algebra", 3, &mut rng);
        assert_eq!(out.questions.len(), 3);
    }

    #[tokio::test]
    async fn incomplete_items_are_backfilled_and_not_cached() {
        struct Sparse;

        #[async_trait]
        impl QuestionGenerator for Sparse {
            fn name(&self) -> &str {
                "sparse"
            }

            async fn generate_questions(
                &self,
                request: &QuestionRequest,
            ) -> Result<Vec<RawQuestion>, ProviderError> {
                Ok(vec![RawQuestion::default(); request.count])
            }
        }

        let (store, assembler) = assembler(Some(Arc::new(Sparse)));
        let batch = assembler
            .generate_exam(&ai_request(&["Geometry"], 3))
            .await
            .unwrap();
        assert_eq!(batch.questions.len(), 3);
        assert!(batch
            .questions
            .iter()
            .all(|q| q.options.len() == 4 && q.options.contains_key(&q.answer)));
        assert!(store.is_empty());
    }
}
