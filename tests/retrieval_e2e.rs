//! End-to-end retrieval over a synthetic 7-page wiki fixture: build an
//! index from markdown on disk with the local hash embedder, then run
//! the full query pipeline (expansion, hints, ladder filter, hybrid
//! ranking) against it.

use std::path::Path;

use wiki_rag::embedder::EmbedKind;
use wiki_rag::index::{WikiIndex, build_or_load_index};
use wiki_rag::{EmbeddingProvider, Intent, RagConfig, search_index};

fn offline_config() -> RagConfig {
    RagConfig {
        data_dir: "unused".into(),
        default_repo: String::new(),
        // Forced local embeddings, regardless of the test environment.
        openai_api_key: None,
        openai_embedding_model: "text-embedding-3-small".to_string(),
        openai_base_url: "https://api.openai.com/v1".to_string(),
    }
}

fn write_fixture_wiki(dir: &Path) {
    let pages: &[(&str, &str)] = &[
        (
            "Home.md",
            "# Welcome\nThis wiki documents the station assistant: market metrics, \
             scanning tools, execution planning and the public API.\n\n\
             ## Getting started\nPick a tool page from the sidebar. Most workflows start \
             with station trading or a radius scan.\n",
        ),
        (
            "Station-Trading.md",
            "# Overview\nStation trading buys and resells orders inside a single station. \
             The scanner grades every candidate order with a set of metrics.\n\n\
             ## Metrics\nCTS, the composite trade score, blends margin, velocity and \
             competition into one number. SDS, the scam detection score, flags orders \
             that look like bait. PVI, the price volatility index, measures how unstable \
             the price history is. BVS compares buy and sell flow to estimate market \
             velocity.\n\n\
             ## Filters\nMinimum margin, maximum competition and volume filters narrow \
             the scan parameters before grading starts.\n\n\
             ## Станционный трейдинг\nСтанционный трейдинг перепродаёт ордера внутри одной \
             станции. Сканер оценивает каждый ордер по метрикам CTS, SDS и PVI, затем \
             фильтры отбирают лучшие кандидаты для торговли.\n",
        ),
        (
            "Radius-Scan.md",
            "# Overview\nA radius scan walks every market within a jump radius of the \
             chosen system and compares orders across structures.\n\n\
             ## What the scan includes\nThe scan includes player structures, NPC stations \
             and citadels in range. Each structure is queried for sell orders and the \
             spread is computed against the reference hub.\n\n\
             ## Parameters\nRadius in jumps, minimum profit per unit and cargo capacity \
             bound the scan.\n",
        ),
        (
            "Execution-Plan.md",
            "# Overview\nThe execution plan turns graded opportunities into an ordered \
             task list: buy, haul and sell steps with expected profit.\n\n\
             ## Row states\nRows marked done are finished trades. Rows marked ignored \
             were dismissed by the trader and stay hidden until the plan is rebuilt. \
             The command center view groups rows by station.\n",
        ),
        (
            "API-Reference.md",
            "# Overview\nThe station assistant exposes a small HTTP API for integrations.\n\n\
             ## Chat\nPOST /api/chat accepts a question and returns an answer grounded in \
             this wiki. The chat endpoint streams tokens and reports retrieval warnings.\n\n\
             ## Errors\nEvery endpoint returns structured errors with a status code and a \
             message. Configuration problems surface as 503 responses from the ai \
             backend.\n",
        ),
        (
            "PLEX-Dashboard.md",
            "# Overview\nThe PLEX dashboard charts the omega subscription cost against \
             regional PLEX prices and the usd spread between hubs.\n\n\
             ## Alerts\nPrice alerts fire when the spread crosses a configured threshold.\n",
        ),
        (
            "War-Tracker.md",
            "# Overview\nThe war tracker lists active conflicts, contested systems and \
             recent kills near trade routes.\n\n\
             ## Hot systems\nSystems are marked hot when kill activity spikes; hauling \
             through hot systems raises the risk estimate of an execution plan.\n",
        ),
    ];

    for (name, body) in pages {
        std::fs::write(dir.join(name), body).unwrap();
    }
}

async fn fixture_index(data: &Path, mirror: &Path) -> (WikiIndex, EmbeddingProvider) {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
    write_fixture_wiki(mirror);
    let provider = EmbeddingProvider::new(&offline_config()).unwrap();
    let index = build_or_load_index(data, &provider, "acme/station-ai", mirror)
        .await
        .unwrap();
    (index, provider)
}

#[tokio::test]
async fn published_index_invariants_hold() {
    let mirror = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    let (index, _) = fixture_index(data.path(), mirror.path()).await;

    assert!(!index.chunks.is_empty());
    assert_eq!(index.chunks.len(), index.vectors.len());
    assert_eq!(index.embed_kind, EmbedKind::Local);
    for v in &index.vectors {
        assert_eq!(v.len(), index.embed_dim);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    // The Russian section of Station-Trading must have been detected.
    assert!(
        index
            .chunks
            .iter()
            .any(|c| c.page_slug == "Station-Trading" && c.locale == "ru")
    );
    assert!(
        index
            .chunks
            .iter()
            .any(|c| c.page_slug == "Station-Trading" && c.locale == "en")
    );
}

struct EvalCase {
    query: &'static str,
    intent: Intent,
    locale: &'static str,
    expected: &'static str,
}

fn eval_cases() -> Vec<EvalCase> {
    vec![
        EvalCase { query: "what is cts", intent: Intent::Trading, locale: "en", expected: "Station-Trading" },
        EvalCase { query: "what is sds", intent: Intent::Trading, locale: "en", expected: "Station-Trading" },
        EvalCase { query: "radius scan structures include", intent: Intent::Trading, locale: "en", expected: "Radius-Scan" },
        EvalCase { query: "done ignored command center", intent: Intent::Trading, locale: "en", expected: "Execution-Plan" },
        EvalCase { query: "station ai chat endpoint", intent: Intent::Debug, locale: "en", expected: "API-Reference" },
        EvalCase { query: "omega plex usd spread", intent: Intent::Product, locale: "en", expected: "PLEX-Dashboard" },
        EvalCase { query: "how to read war tracker hot systems", intent: Intent::Trading, locale: "en", expected: "War-Tracker" },
        EvalCase { query: "execution plan rows done and ignored", intent: Intent::Trading, locale: "en", expected: "Execution-Plan" },
        EvalCase { query: "price volatility index meaning", intent: Intent::Trading, locale: "en", expected: "Station-Trading" },
        EvalCase { query: "станционный трейдинг с чего начать", intent: Intent::Trading, locale: "ru", expected: "Station-Trading" },
        EvalCase { query: "how do I call the chat api endpoint", intent: Intent::Debug, locale: "en", expected: "API-Reference" },
    ]
}

async fn top1(
    index: &WikiIndex,
    provider: &EmbeddingProvider,
    case: &EvalCase,
) -> Option<String> {
    let (snippets, _) =
        search_index(index, provider, case.locale, case.query, case.intent, 1).await;
    snippets
        .first()
        .and_then(|s| s.url.rsplit('/').next().map(str::to_string))
}

#[tokio::test]
async fn core_scenarios_hit_their_pages() {
    let mirror = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    let (index, provider) = fixture_index(data.path(), mirror.path()).await;

    for case in eval_cases().iter().take(6) {
        let got = top1(&index, &provider, case).await;
        assert_eq!(
            got.as_deref(),
            Some(case.expected),
            "query {:?} ({:?})",
            case.query,
            case.intent
        );
    }
}

#[tokio::test]
async fn recall_at_1_meets_target_and_baseline() {
    let mirror = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    let (index, provider) = fixture_index(data.path(), mirror.path()).await;

    let cases = eval_cases();
    let mut hits = 0usize;
    let mut baseline_hits = 0usize;

    for case in &cases {
        if top1(&index, &provider, case).await.as_deref() == Some(case.expected) {
            hits += 1;
        }
        if keyword_baseline_top1(&index, case.query).as_deref() == Some(case.expected) {
            baseline_hits += 1;
        }
    }

    let recall = hits as f64 / cases.len() as f64;
    let baseline = baseline_hits as f64 / cases.len() as f64;

    assert!(recall >= 0.80, "recall@1 = {recall:.2}");
    assert!(
        recall >= baseline - 0.05,
        "recall@1 = {recall:.2} regressed below keyword baseline {baseline:.2}"
    );
}

/// Naive keyword baseline: the page of the chunk sharing the most
/// query tokens wins.
fn keyword_baseline_top1(index: &WikiIndex, query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();

    index
        .chunks
        .iter()
        .map(|chunk| {
            let haystack =
                format!("{} {} {}", chunk.content, chunk.section, chunk.page_title).to_lowercase();
            let score = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
            (score, chunk.page_slug.clone())
        })
        .max_by_key(|(score, _)| *score)
        .filter(|(score, _)| *score > 0)
        .map(|(_, slug)| slug)
}

#[tokio::test]
async fn query_embedding_failure_degrades_to_bm25() {
    let mirror = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    let (mut index, provider) = fixture_index(data.path(), mirror.path()).await;

    // Pretend the corpus was embedded remotely: with no API key the
    // query-side embed fails and ranking must fall back to BM25 only.
    index.embed_kind = EmbedKind::OpenAi;
    index.embed_model = "text-embedding-3-small".to_string();

    let (snippets, _) = search_index(
        &index,
        &provider,
        "en",
        "radius scan structures include",
        Intent::Trading,
        3,
    )
    .await;

    assert!(!snippets.is_empty());
    assert!(snippets.iter().all(|s| s.dense_score == 0.0));
    assert!(snippets[0].url.ends_with("/Radius-Scan"));
    assert!(snippets[0].sparse_score > 0.0);
}

#[tokio::test]
async fn snippets_carry_presentation_fields() {
    let mirror = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    let (index, provider) = fixture_index(data.path(), mirror.path()).await;

    let (snippets, _) = search_index(
        &index,
        &provider,
        "en",
        "what is cts",
        Intent::Trading,
        2,
    )
    .await;

    assert!(!snippets.is_empty());
    let top = &snippets[0];
    assert_eq!(top.source, "WIKI");
    assert_eq!(top.page, "Station Trading");
    assert!(top.url.starts_with("https://github.com/acme/station-ai/wiki/"));
    assert!(top.content.chars().count() <= 760);
    assert_eq!(top.score, (top.fused_score * 1000.0).round() as i64);
    assert!(top.title == top.page || top.title.starts_with("Station Trading - "));
}
