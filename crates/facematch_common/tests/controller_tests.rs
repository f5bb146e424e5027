//! Round controller driven step by step against the simulated quiz

use async_trait::async_trait;
use facematch_common::host::{CandidateSurface, OutcomeSurface, PresentationSource};
use facematch_common::sim::{LocatorStyle, SimConfig, SimulatedQuiz};
use facematch_common::{
    Candidate, Config, FaceMatchError, GuessMethod, GuessPolicy, Host, IdentityHasher,
    IdentityKey, JsonFileStore, KnowledgeBase, Mode, Name, RoundController, RoundEvent,
    RoundState,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn quiz(people: usize, options: usize, style: LocatorStyle, stall_every: u64) -> Arc<SimulatedQuiz> {
    Arc::new(SimulatedQuiz::new(SimConfig {
        people,
        options,
        stall_every,
        style,
        seed: Some(42),
        ..Default::default()
    }))
}

fn controller(quiz: &Arc<SimulatedQuiz>, kb: KnowledgeBase, mode: Mode) -> RoundController {
    let mut config = Config::default();
    config.mode = mode;
    let hasher = IdentityHasher::new(&config.hasher, quiz.clone()).unwrap();
    RoundController::new(kb, hasher, GuessPolicy::new(Some(11)), &config)
}

/// Key the structural hasher gives the roster's `index`-th person
fn structural_key(index: usize) -> IdentityKey {
    IdentityKey::new(format!("q{}", index + 1))
}

async fn learning_round(ctl: &mut RoundController, quiz: &SimulatedQuiz, host: &Host) -> RoundEvent {
    quiz.advance();
    let submitted = ctl.poll_presentation(host).await;
    assert!(matches!(submitted, RoundEvent::Submitted { .. }), "{:?}", submitted);
    ctl.check_outcome(host).await
}

#[tokio::test]
async fn test_learning_round_learns_revealed_answer() {
    let quiz = quiz(5, 3, LocatorStyle::Structural, 0);
    let host = Host::from_single(quiz.clone());
    let mut ctl = controller(&quiz, KnowledgeBase::new(), Mode::Learning);

    quiz.advance();
    let event = ctl.poll_presentation(&host).await;
    assert!(matches!(event, RoundEvent::Submitted { .. }));
    assert_eq!(ctl.state(), RoundState::AwaitingOutcome);
    assert!(ctl.pending().is_some());

    let shown = quiz.current_person().unwrap();
    match ctl.check_outcome(&host).await {
        RoundEvent::Learned { key, confirmed, outcome, .. } => {
            assert_eq!(confirmed, shown);
            assert!(outcome.new_person);
            assert_eq!(ctl.knowledge().lookup(&key), Some(&shown));
            // Every other option on offer is now known wrong for this key
            assert_eq!(ctl.knowledge().exclusions_for(&key).len(), 2);
        }
        other => panic!("expected Learned, got {:?}", other),
    }
    assert_eq!(ctl.state(), RoundState::Idle);
    assert!(ctl.pending().is_none());
    assert_eq!(ctl.session_stats().new_people, 1);
}

#[tokio::test]
async fn test_same_source_is_not_processed_twice() {
    let quiz = quiz(5, 3, LocatorStyle::Structural, 0);
    let host = Host::from_single(quiz.clone());
    let mut ctl = controller(&quiz, KnowledgeBase::new(), Mode::Learning);

    learning_round(&mut ctl, &quiz, &host).await;

    assert_eq!(ctl.poll_presentation(&host).await, RoundEvent::Idle);
    assert_eq!(ctl.session_stats().rounds, 1);
    assert_eq!(quiz.report().submissions, 1);
}

#[tokio::test]
async fn test_new_image_deferred_while_round_pending() {
    let quiz = quiz(5, 3, LocatorStyle::Structural, 0);
    let host = Host::from_single(quiz.clone());
    let mut ctl = controller(&quiz, KnowledgeBase::new(), Mode::Learning);

    quiz.advance();
    ctl.poll_presentation(&host).await;
    let first_key = ctl.pending().unwrap().key.clone();

    // Page moves on before the answer was read
    quiz.advance();
    assert_eq!(ctl.poll_presentation(&host).await, RoundEvent::Deferred);
    assert_eq!(ctl.pending().unwrap().key, first_key);
    assert_eq!(quiz.report().submissions, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_outcome_times_out_without_learning() {
    let quiz = quiz(5, 3, LocatorStyle::Structural, 1);
    let host = Host::from_single(quiz.clone());
    let mut ctl = controller(&quiz, KnowledgeBase::new(), Mode::Learning);

    quiz.advance();
    ctl.poll_presentation(&host).await;
    assert_eq!(ctl.check_outcome(&host).await, RoundEvent::Waiting);

    tokio::time::advance(Duration::from_millis(4_999)).await;
    assert_eq!(ctl.check_outcome(&host).await, RoundEvent::Waiting);

    tokio::time::advance(Duration::from_millis(2)).await;
    assert!(matches!(ctl.check_outcome(&host).await, RoundEvent::TimedOut { .. }));

    assert!(ctl.pending().is_none());
    assert_eq!(ctl.knowledge().tracked_len(), 0);
    assert_eq!(ctl.session_stats().timeouts, 1);
    assert_eq!(ctl.session_stats().attempts, 1);
}

#[tokio::test]
async fn test_guessing_answers_known_images_immediately() {
    let quiz = quiz(6, 4, LocatorStyle::Structural, 0);
    let host = Host::from_single(quiz.clone());

    let roster: Vec<Name> = quiz.roster().to_vec();
    let mut kb = KnowledgeBase::new();
    for (i, name) in roster.iter().enumerate() {
        kb.record_outcome(&structural_key(i), &roster, name);
    }
    let mut ctl = controller(&quiz, kb, Mode::Guessing);

    for _ in 0..10 {
        quiz.advance();
        match ctl.on_presentation_changed(&host).await {
            RoundEvent::Answered { name, .. } => assert_eq!(Some(name), quiz.current_person()),
            other => panic!("expected Answered, got {:?}", other),
        }
        assert!(ctl.pending().is_none());
    }

    assert_eq!(ctl.session_stats().correct, 10);
    assert_eq!(quiz.report().correct, 10);
}

#[tokio::test]
async fn test_guessing_unknown_image_runs_learning_round() {
    let quiz = quiz(6, 4, LocatorStyle::Structural, 0);
    let host = Host::from_single(quiz.clone());
    let mut ctl = controller(&quiz, KnowledgeBase::new(), Mode::Guessing);

    quiz.advance();
    match ctl.on_presentation_changed(&host).await {
        RoundEvent::Submitted { guess, .. } => assert_eq!(guess.method, GuessMethod::Smart),
        other => panic!("expected Submitted, got {:?}", other),
    }
    assert!(matches!(ctl.check_outcome(&host).await, RoundEvent::Learned { .. }));
    assert_eq!(ctl.knowledge().people(), 1);
}

#[tokio::test]
async fn test_learning_converges_to_correct_bijection() {
    let quiz = quiz(8, 4, LocatorStyle::Structural, 0);
    let host = Host::from_single(quiz.clone());
    let mut ctl = controller(&quiz, KnowledgeBase::new(), Mode::Learning);

    for _ in 0..200 {
        let event = learning_round(&mut ctl, &quiz, &host).await;
        assert!(matches!(event, RoundEvent::Learned { .. }), "{:?}", event);
    }

    let kb = ctl.knowledge();
    let roster = quiz.roster();
    assert_eq!(kb.people(), roster.len());

    let assignments = kb.assignments();
    let names: HashSet<&Name> = assignments.iter().map(|(_, n)| n).collect();
    assert_eq!(names.len(), assignments.len());

    for (i, name) in roster.iter().enumerate() {
        let key = structural_key(i);
        assert_eq!(kb.lookup(&key), Some(name));
        for (other, other_name) in &assignments {
            if other != &key {
                assert!(kb.exclusions_for(&key).contains(other_name));
            }
        }
    }
}

#[tokio::test]
async fn test_knowledge_makes_later_guesses_correct() {
    let quiz = quiz(5, 3, LocatorStyle::Structural, 0);
    let host = Host::from_single(quiz.clone());
    let mut ctl = controller(&quiz, KnowledgeBase::new(), Mode::Learning);

    for _ in 0..100 {
        learning_round(&mut ctl, &quiz, &host).await;
    }
    ctl.set_mode(Mode::Learning);

    for _ in 0..20 {
        match learning_round(&mut ctl, &quiz, &host).await {
            RoundEvent::Learned { correct, outcome, .. } => {
                assert!(correct);
                assert!(!outcome.new_person);
            }
            other => panic!("expected Learned, got {:?}", other),
        }
    }
    assert_eq!(ctl.session_stats().accuracy(), Some(100.0));
}

#[tokio::test]
async fn test_content_keys_identify_people() {
    let quiz = quiz(6, 3, LocatorStyle::Content, 0);
    let host = Host::from_single(quiz.clone());
    let mut ctl = controller(&quiz, KnowledgeBase::new(), Mode::Learning);

    for _ in 0..120 {
        learning_round(&mut ctl, &quiz, &host).await;
    }

    assert_eq!(ctl.knowledge().people(), 6);
    // Every round had a fresh locator
    assert_eq!(ctl.hasher().content_derivations(), 120);
    assert_eq!(ctl.hasher().cache_len(), 120);
}

#[tokio::test]
async fn test_mode_switch_discards_pending_round() {
    let quiz = quiz(5, 3, LocatorStyle::Structural, 0);
    let host = Host::from_single(quiz.clone());
    let mut ctl = controller(&quiz, KnowledgeBase::new(), Mode::Learning);

    quiz.advance();
    ctl.poll_presentation(&host).await;
    ctl.set_mode(Mode::Guessing);

    assert!(ctl.pending().is_none());
    assert_eq!(ctl.mode(), Mode::Guessing);
    assert_eq!(ctl.session_stats().attempts, 0);
    // The revealed answer is never learned
    assert_eq!(ctl.check_outcome(&host).await, RoundEvent::Idle);
    assert_eq!(ctl.knowledge().people(), 0);
}

#[tokio::test]
async fn test_reset_knowledge_clears_everything() {
    let quiz = quiz(5, 3, LocatorStyle::Structural, 0);
    let host = Host::from_single(quiz.clone());
    let mut ctl = controller(&quiz, KnowledgeBase::new(), Mode::Learning);

    for _ in 0..5 {
        learning_round(&mut ctl, &quiz, &host).await;
    }
    ctl.reset_knowledge();

    assert_eq!(ctl.knowledge().tracked_len(), 0);
    assert_eq!(ctl.hasher().cache_len(), 0);
    assert_eq!(ctl.progress_report().recent.len(), 0);
    // The image still on display counts as new again
    assert!(matches!(ctl.poll_presentation(&host).await, RoundEvent::Submitted { .. }));
}

#[tokio::test]
async fn test_learning_persists_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let quiz = quiz(5, 3, LocatorStyle::Structural, 0);
    let host = Host::from_single(quiz.clone());

    let learned = {
        let kb = KnowledgeBase::open(Box::new(JsonFileStore::new(dir.path(), "kb")));
        let mut ctl = controller(&quiz, kb, Mode::Learning);
        for _ in 0..10 {
            learning_round(&mut ctl, &quiz, &host).await;
        }
        ctl.knowledge().assignments()
    };

    let reopened = KnowledgeBase::open(Box::new(JsonFileStore::new(dir.path(), "kb")));
    assert_eq!(reopened.assignments(), learned);
    assert!(!learned.is_empty());
}

/// One fixed picture whose options may appear late or refuse clicks
struct SlowPage {
    options: Mutex<Vec<Candidate>>,
    submitted: Mutex<Vec<Name>>,
    /// Submissions to reject before accepting
    refusals: Mutex<u32>,
}

#[async_trait]
impl PresentationSource for SlowPage {
    async fn current_image_source(&self) -> Option<String> {
        Some("https://quiz.example/questions/9/picture".to_string())
    }
}

#[async_trait]
impl CandidateSurface for SlowPage {
    async fn current_candidates(&self) -> Vec<Candidate> {
        self.options.lock().unwrap().clone()
    }

    async fn submit(&self, candidate: &Candidate) -> facematch_common::Result<()> {
        let mut refusals = self.refusals.lock().unwrap();
        if *refusals > 0 {
            *refusals -= 1;
            return Err(FaceMatchError::Host("button not clickable yet".into()));
        }
        self.submitted.lock().unwrap().push(candidate.name.clone());
        Ok(())
    }
}

#[async_trait]
impl OutcomeSurface for SlowPage {
    async fn confirmed_name(&self) -> Option<Name> {
        None
    }
}

#[tokio::test]
async fn test_source_without_candidates_is_retried() {
    let page = Arc::new(SlowPage {
        options: Mutex::new(vec![Candidate {
            index: 0,
            name: "Ann".into(),
            already_answered: true,
        }]),
        submitted: Mutex::new(Vec::new()),
        refusals: Mutex::new(0),
    });
    let host = Host::from_single(page.clone());
    let quiz = quiz(2, 2, LocatorStyle::Structural, 0);
    let mut ctl = controller(&quiz, KnowledgeBase::new(), Mode::Learning);

    assert_eq!(ctl.poll_presentation(&host).await, RoundEvent::NoCandidates);
    assert_eq!(ctl.state(), RoundState::Idle);

    page.options.lock().unwrap().push(Candidate::new(1, "Ben"));
    match ctl.poll_presentation(&host).await {
        RoundEvent::Submitted { key, guess } => {
            assert_eq!(key.as_str(), "q9");
            assert_eq!(guess.name, "Ben");
        }
        other => panic!("expected Submitted, got {:?}", other),
    }
    assert_eq!(*page.submitted.lock().unwrap(), vec!["Ben".to_string()]);
}

#[tokio::test]
async fn test_failed_submit_is_retried() {
    let page = Arc::new(SlowPage {
        options: Mutex::new(vec![Candidate::new(0, "Ann"), Candidate::new(1, "Ben")]),
        submitted: Mutex::new(Vec::new()),
        refusals: Mutex::new(1),
    });
    let host = Host::from_single(page.clone());
    let quiz = quiz(2, 2, LocatorStyle::Structural, 0);
    let mut ctl = controller(&quiz, KnowledgeBase::new(), Mode::Learning);

    assert_eq!(ctl.poll_presentation(&host).await, RoundEvent::SubmitFailed);
    assert!(ctl.pending().is_none());
    assert_eq!(ctl.session_stats().attempts, 0);

    assert!(matches!(ctl.poll_presentation(&host).await, RoundEvent::Submitted { .. }));
    assert_eq!(page.submitted.lock().unwrap().len(), 1);
    assert_eq!(ctl.session_stats().attempts, 1);
    assert_eq!(ctl.poll_presentation(&host).await, RoundEvent::Deferred);
}
