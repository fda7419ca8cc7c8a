use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use uuid::Uuid;

use super::aggregate::EntityAggregator;
use super::batcher::probe_batch_size;
use super::corpus::{collect_note_files, load_notes};
use super::ner::{InferenceError, NerModel};
use super::strip::neutralize_links;
use super::types::{percent_complete, ProgressEvent};
use super::ExtractionError;
use crate::config::ExtractionConfig;
use crate::models::EntityStore;
use crate::pipeline::storage::save_store;

/// Run extraction without progress reporting or cancellation.
pub fn extract<M: NerModel + ?Sized>(
    config: &ExtractionConfig,
    model: &mut M,
) -> Result<EntityStore, ExtractionError> {
    run_extraction(config, model, None, None)
}

/// Extract entities from every note under `config.notes_root` and persist
/// the resulting store to `config.output`.
///
/// Progress goes to `progress_fn`: `Started`, `Progress` 0, one `Progress`
/// per batch, a final `Progress` 100 once the store is written, then
/// `Completed`. Any error emits `Failed` instead and leaves the
/// existing store file untouched.
///
/// `cancel` is checked between batches and before the store is written.
pub fn run_extraction<M: NerModel + ?Sized>(
    config: &ExtractionConfig,
    model: &mut M,
    progress_fn: Option<&dyn Fn(ProgressEvent)>,
    cancel: Option<&AtomicBool>,
) -> Result<EntityStore, ExtractionError> {
    let result = run_inner(config, model, progress_fn, cancel);

    if let Err(e) = &result {
        tracing::error!(error = %e, "Extraction failed");
        if let Some(progress) = progress_fn {
            progress(ProgressEvent::Failed {
                error: e.to_string(),
            });
        }
    }

    result
}

fn run_inner<M: NerModel + ?Sized>(
    config: &ExtractionConfig,
    model: &mut M,
    progress_fn: Option<&dyn Fn(ProgressEvent)>,
    cancel: Option<&AtomicBool>,
) -> Result<EntityStore, ExtractionError> {
    let start = Instant::now();
    let config = config.validate()?;
    let run_id = Uuid::new_v4();

    let files = collect_note_files(&config)?;
    let total = files.len();

    tracing::info!(
        %run_id,
        root = %config.notes_root.display(),
        files = total,
        model = model.name(),
        "Extraction started"
    );

    if let Some(progress) = progress_fn {
        progress(ProgressEvent::Started {
            run_id,
            file_count: total as u32,
        });
        progress(ProgressEvent::Progress {
            percent: 0,
            files_processed: 0,
            total_files: total as u32,
        });
    }

    let notes = load_notes(&files)?;
    check_cancelled(cancel)?;

    // Probe on raw text: link markup only makes inputs longer.
    let sample: Vec<&str> = notes
        .iter()
        .take(config.probe_sample_size)
        .map(|n| n.text.as_str())
        .collect();
    let batch_size = probe_batch_size(model, &sample, config.initial_batch_size)
        .map_err(|e| inference_error(e, config.initial_batch_size))?;

    let mut aggregator = EntityAggregator::new();
    let mut processed = 0usize;

    for batch in notes.chunks(batch_size) {
        check_cancelled(cancel)?;

        let stripped: Vec<String> = batch.iter().map(|n| neutralize_links(&n.text)).collect();
        let inputs: Vec<&str> = stripped.iter().map(String::as_str).collect();

        let results = model
            .infer(&inputs, batch_size)
            .map_err(|e| inference_error(e, batch_size))?;

        if results.len() != batch.len() {
            return Err(ExtractionError::Inference(format!(
                "model returned {} results for {} texts",
                results.len(),
                batch.len()
            )));
        }

        for ((note, text), mentions) in batch.iter().zip(&stripped).zip(&results) {
            for mention in mentions {
                aggregator.add(&note.path, text, mention);
            }
        }

        processed += batch.len();
        tracing::debug!(
            processed,
            total,
            entities = aggregator.entity_count(),
            "Batch processed"
        );

        if let Some(progress) = progress_fn {
            progress(ProgressEvent::Progress {
                percent: percent_complete(processed, total),
                files_processed: processed as u32,
                total_files: total as u32,
            });
        }
    }

    check_cancelled(cancel)?;

    let discarded = aggregator.discarded();
    let store = EntityStore {
        entities: aggregator.finish(),
        processed_files: files,
    };
    save_store(&config.output, &store)?;

    let duration_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        %run_id,
        entities = store.entities.len(),
        occurrences = store.occurrence_count(),
        discarded,
        batch_size,
        duration_ms,
        output = %config.output.display(),
        "Extraction completed"
    );

    if let Some(progress) = progress_fn {
        progress(ProgressEvent::Progress {
            percent: 100,
            files_processed: total as u32,
            total_files: total as u32,
        });
        progress(ProgressEvent::Completed {
            entities_found: store.entities.len() as u32,
            files_processed: total as u32,
            batch_size: batch_size as u32,
            duration_ms,
        });
    }

    Ok(store)
}

fn check_cancelled(cancel: Option<&AtomicBool>) -> Result<(), ExtractionError> {
    match cancel {
        Some(flag) if flag.load(Ordering::Relaxed) => Err(ExtractionError::Cancelled),
        _ => Ok(()),
    }
}

fn inference_error(e: InferenceError, batch_size: usize) -> ExtractionError {
    match e {
        InferenceError::Capacity(message) => ExtractionError::InferenceCapacity {
            batch_size,
            message,
        },
        InferenceError::Failed(message) => ExtractionError::Inference(message),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::path::{Path, PathBuf};

    use super::*;
    use crate::models::RawMention;
    use crate::pipeline::extraction::MockNerModel;
    use crate::pipeline::storage::load_store;

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    fn run_collecting(
        config: &ExtractionConfig,
        model: &mut dyn NerModel,
    ) -> (Result<EntityStore, ExtractionError>, Vec<ProgressEvent>) {
        let events = RefCell::new(Vec::new());
        let sink = |e: ProgressEvent| events.borrow_mut().push(e);
        let result = run_extraction(config, model, Some(&sink), None);
        (result, events.into_inner())
    }

    fn percents(events: &[ProgressEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Progress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect()
    }

    /// Tags each text with whatever the closure returns for it.
    struct FnModel<F>(F);

    impl<F: FnMut(&str) -> Vec<RawMention>> NerModel for FnModel<F> {
        fn name(&self) -> &str {
            "fn"
        }

        fn infer(
            &mut self,
            texts: &[&str],
            _batch_size: usize,
        ) -> Result<Vec<Vec<RawMention>>, InferenceError> {
            Ok(texts.iter().map(|&t| (self.0)(t)).collect())
        }
    }

    /// Succeeds on the probe, then reports one result too few.
    struct ShortResultModel;

    impl NerModel for ShortResultModel {
        fn name(&self) -> &str {
            "short"
        }

        fn infer(
            &mut self,
            texts: &[&str],
            _batch_size: usize,
        ) -> Result<Vec<Vec<RawMention>>, InferenceError> {
            Ok(vec![Vec::new(); texts.len().saturating_sub(1)])
        }
    }

    #[test]
    fn two_notes_produce_merged_entity_with_occurrences() {
        let dir = tempfile::tempdir().unwrap();
        let notes = dir.path().join("notes");
        std::fs::create_dir(&notes).unwrap();
        write(&notes, "a.md", "I visited Paris.");
        write(&notes, "b.md", "Paris is big.");
        let output = dir.path().join("entities.json");

        let mut model = MockNerModel::new().with_term("Paris", "LOC", 0.9);
        let config = ExtractionConfig::new(&notes, &output);
        let store = extract(&config, &mut model).unwrap();

        assert_eq!(store.entities.len(), 1);
        let paris = &store.entities[0];
        assert_eq!(paris.label, "LOC");
        assert_eq!(paris.canonical_word, "Paris");
        assert!((paris.score - 1.8).abs() < 1e-6);

        let spans: Vec<_> = paris
            .occurrences
            .iter()
            .map(|o| {
                let name = o.file.file_name().unwrap().to_string_lossy().to_string();
                (name, o.span.start, o.span.end)
            })
            .collect();
        assert_eq!(
            spans,
            vec![("a.md".to_string(), 10, 15), ("b.md".to_string(), 0, 5)]
        );
        assert_eq!(store.processed_files.len(), 2);

        // persisted copy matches what was returned
        let loaded = load_store(&output).unwrap();
        assert_eq!(loaded.entities.len(), 1);
        assert_eq!(loaded.processed_files, store.processed_files);
    }

    #[test]
    fn scores_sum_across_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.md", "Berlin");
        write(dir.path(), "b.md", "Berlin!");
        let output = dir.path().join("out/entities.json");

        let mut model = FnModel(|text: &str| {
            let score = if text.ends_with('!') { 0.95 } else { 0.9 };
            vec![RawMention::new("LOC", score, 0, 6)]
        });
        let store = extract(&ExtractionConfig::new(dir.path(), &output), &mut model).unwrap();

        assert_eq!(store.entities.len(), 1);
        assert_eq!(store.entities[0].occurrences.len(), 2);
        assert!((store.entities[0].score - 1.85).abs() < 1e-6);
        assert!(output.exists());
    }

    #[test]
    fn link_markup_is_not_seen_by_the_model() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.md", "See [[Paris]] and Paris.");
        let output = dir.path().join("entities.json");

        let mut model = MockNerModel::new().with_term("Paris", "LOC", 0.9);
        let store = extract(&ExtractionConfig::new(dir.path(), &output), &mut model).unwrap();

        let occ = &store.entities[0].occurrences;
        assert_eq!(occ.len(), 1);
        assert_eq!((occ[0].span.start, occ[0].span.end), (18, 23));
    }

    #[test]
    fn progress_is_monotone_and_ends_with_completed() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            write(dir.path(), &format!("n{i}.md"), "Ada");
        }
        let mut config = ExtractionConfig::new(dir.path(), dir.path().join("entities.json"));
        config.initial_batch_size = 2;

        let mut model = MockNerModel::new().with_term("Ada", "PER", 0.9);
        let (result, events) = run_collecting(&config, &mut model);
        result.unwrap();

        assert!(matches!(
            events.first(),
            Some(ProgressEvent::Started { file_count: 5, .. })
        ));
        assert_eq!(percents(&events), vec![0, 40, 80, 100, 100]);
        assert!(percents(&events).windows(2).all(|w| w[0] <= w[1]));
        match events.last() {
            Some(ProgressEvent::Completed {
                entities_found,
                files_processed,
                batch_size,
                ..
            }) => {
                assert_eq!(*entities_found, 1);
                assert_eq!(*files_processed, 5);
                assert_eq!(*batch_size, 2);
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[test]
    fn single_batch_reports_plain_percentages() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.md", "Ada");
        write(dir.path(), "b.md", "Ada");
        let config = ExtractionConfig::new(dir.path(), dir.path().join("entities.json"));

        let mut model = MockNerModel::new().with_term("Ada", "PER", 0.9);
        let (result, events) = run_collecting(&config, &mut model);
        result.unwrap();

        assert_eq!(percents(&events), vec![0, 100, 100]);
        assert!(matches!(events.last(), Some(ProgressEvent::Completed { .. })));
    }

    #[test]
    fn batches_use_the_probed_size() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..10 {
            write(dir.path(), &format!("n{i}.md"), "text");
        }
        let config = ExtractionConfig::new(dir.path(), dir.path().join("entities.json"));

        let mut model = MockNerModel::new().with_capacity_limit(4);
        extract(&config, &mut model).unwrap();

        let calls: Vec<_> = model
            .calls()
            .iter()
            .map(|c| (c.batch_size, c.text_count))
            .collect();
        // probe 32 → 16 → 8 → 4, then 10 notes in batches of 4
        assert_eq!(
            calls,
            vec![(32, 10), (16, 10), (8, 10), (4, 10), (4, 4), (4, 4), (4, 2)]
        );
    }

    #[test]
    fn empty_corpus_writes_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let notes = dir.path().join("notes");
        std::fs::create_dir(&notes).unwrap();
        let output = dir.path().join("entities.json");

        let mut model = MockNerModel::new();
        let (result, events) = run_collecting(&ExtractionConfig::new(&notes, &output), &mut model);
        let store = result.unwrap();

        assert!(store.entities.is_empty());
        assert!(store.processed_files.is_empty());
        assert_eq!(percents(&events), vec![0, 100]);
        assert!(model.calls().is_empty());
        assert!(load_store(&output).unwrap().entities.is_empty());
    }

    #[test]
    fn fatal_inference_error_keeps_previous_store() {
        let dir = tempfile::tempdir().unwrap();
        let notes = dir.path().join("notes");
        std::fs::create_dir(&notes).unwrap();
        write(&notes, "a.md", "Ada");
        let output = dir.path().join("entities.json");
        std::fs::write(&output, "previous").unwrap();

        let mut model = MockNerModel::new().failing("weights missing");
        let (result, events) = run_collecting(&ExtractionConfig::new(&notes, &output), &mut model);

        assert!(matches!(result, Err(ExtractionError::Inference(ref m)) if m == "weights missing"));
        assert!(matches!(events.last(), Some(ProgressEvent::Failed { .. })));
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "previous");
    }

    #[test]
    fn capacity_at_batch_size_one_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let notes = dir.path().join("notes");
        std::fs::create_dir(&notes).unwrap();
        write(&notes, "a.md", "Ada");
        let output = dir.path().join("entities.json");
        std::fs::write(&output, "previous").unwrap();

        let mut model = MockNerModel::new().with_capacity_limit(0);
        let (result, events) = run_collecting(&ExtractionConfig::new(&notes, &output), &mut model);

        assert!(matches!(
            result,
            Err(ExtractionError::InferenceCapacity { batch_size: 1, .. })
        ));
        let sizes: Vec<_> = model.calls().iter().map(|c| c.batch_size).collect();
        // halving down to 1, then the first real batch at 1
        assert_eq!(sizes, vec![32, 16, 8, 4, 2, 1, 1]);
        assert!(matches!(events.last(), Some(ProgressEvent::Failed { .. })));
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "previous");
    }

    #[test]
    fn unreadable_note_aborts_before_inference() {
        let dir = tempfile::tempdir().unwrap();
        let notes = dir.path().join("notes");
        std::fs::create_dir(&notes).unwrap();
        write(&notes, "a.md", "Ada");
        std::fs::write(notes.join("b.md"), [0x41, 0xff, 0xfe, 0x42]).unwrap();
        let output = dir.path().join("entities.json");
        std::fs::write(&output, "previous").unwrap();

        let mut model = MockNerModel::new().with_term("Ada", "PER", 0.9);
        let (result, events) = run_collecting(&ExtractionConfig::new(&notes, &output), &mut model);

        match result {
            Err(ExtractionError::CorpusRead { path, .. }) => assert!(path.ends_with("b.md")),
            other => panic!("expected CorpusRead, got {other:?}"),
        }
        assert!(model.calls().is_empty());
        assert!(matches!(events.last(), Some(ProgressEvent::Failed { .. })));
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "previous");
    }

    #[test]
    fn short_result_list_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.md", "one");
        write(dir.path(), "b.md", "two");
        let output = dir.path().join("entities.json");

        let err = extract(&ExtractionConfig::new(dir.path(), &output), &mut ShortResultModel)
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Inference(_)));
        assert!(!output.exists());
    }

    #[test]
    fn missing_notes_root_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExtractionConfig::new(dir.path().join("nope"), dir.path().join("e.json"));
        let (result, events) = run_collecting(&config, &mut MockNerModel::new());

        assert!(matches!(result, Err(ExtractionError::Config(_))));
        assert_eq!(events.len(), 1);
        assert!(events[0].is_terminal());
    }

    #[test]
    fn cancelled_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.md", "Ada");
        let output = dir.path().join("entities.json");
        let cancel = AtomicBool::new(true);

        let mut model = MockNerModel::new().with_term("Ada", "PER", 0.9);
        let result = run_extraction(
            &ExtractionConfig::new(dir.path(), &output),
            &mut model,
            None,
            Some(&cancel),
        );

        assert!(matches!(result, Err(ExtractionError::Cancelled)));
        assert!(!output.exists());
        assert!(model.calls().is_empty());
    }

    #[test]
    fn mentions_with_bad_spans_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.md", "Ada");
        let output = dir.path().join("entities.json");

        let mut model = FnModel(|_: &str| {
            vec![
                RawMention::new("PER", 0.9, 0, 3),
                RawMention::new("PER", 0.9, 2, 2),
                RawMention::new("PER", 0.9, 1, 40),
            ]
        });
        let store = extract(&ExtractionConfig::new(dir.path(), &output), &mut model).unwrap();
        assert_eq!(store.occurrence_count(), 1);
    }
}
