use jobmesh_core::JobRecord;
use jobmesh_core::dedup::deduplicate;
use jobmesh_core::testutil::{job, job_without_url};

fn sample() -> Vec<JobRecord> {
    vec![
        job("a", "1", "Product Manager", "Acme").with_url("https://x/1"),
        job("b", "9", "Senior PM", "Beta").with_url("https://x/1"),
        job_without_url("c", "3", "PRODUCT MANAGER", "acme"),
        job("c", "4", "Designer", "Gamma"),
        job_without_url("d", "5", "Designer", "Delta"),
        job("d", "6", "designer", "gamma"),
    ]
}

fn keys(jobs: &[JobRecord]) -> Vec<(String, String)> {
    jobs.iter().map(|j| (j.source.clone(), j.id.clone())).collect()
}

#[test]
fn dedup_is_idempotent() {
    let once = deduplicate(sample());
    let twice = deduplicate(once.clone());
    assert_eq!(keys(&once), keys(&twice));
}

#[test]
fn dedup_never_grows_and_keeps_earlier_survivors() {
    let all = sample();
    for split in 0..=all.len() {
        let prefix = deduplicate(all[..split].to_vec());
        let full = deduplicate(all.clone());

        assert!(full.len() <= all.len());
        assert!(prefix.len() <= full.len());
        assert_eq!(keys(&full[..prefix.len()]), keys(&prefix));
    }
}

#[test]
fn url_match_wins_even_when_pair_differs() {
    let kept = deduplicate(vec![
        job("a", "1", "Product Manager", "Acme").with_url("https://x/1"),
        job("b", "1", "Completely Different", "Elsewhere").with_url("https://x/1"),
    ]);
    assert_eq!(keys(&kept), vec![("a".into(), "1".into())]);
}

#[test]
fn pair_match_wins_even_when_urls_differ() {
    let kept = deduplicate(vec![
        job("a", "1", "Product Manager", "Acme").with_url("https://x/1"),
        job("b", "1", "product manager", "ACME").with_url("https://y/2"),
    ]);
    assert_eq!(keys(&kept), vec![("a".into(), "1".into())]);
}

#[test]
fn sample_survivors() {
    let kept = deduplicate(sample());
    assert_eq!(
        keys(&kept),
        vec![
            ("a".into(), "1".into()),
            ("c".into(), "4".into()),
            ("d".into(), "5".into()),
        ]
    );
}
