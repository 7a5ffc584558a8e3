use proptest::prelude::*;
use warden::download::ProgressThrottle;
use warden::process::strip_ansi;

// Chunk sizes arriving from the network, and the advertised total.
fn transfer_strategy() -> impl Strategy<Value = (Vec<u64>, u64)> {
    (
        proptest::collection::vec(1u64..=64 * 1024, 1..200),
        0u64..=1024,
    )
}

proptest! {
    #[test]
    fn throttle_reports_are_spaced_and_final_size_is_always_reported(
        (chunks, min_interval) in transfer_strategy(),
        total_known in any::<bool>(),
    ) {
        let size: u64 = chunks.iter().sum();
        let total = if total_known { size } else { 0 };
        let mut throttle = ProgressThrottle::new(total, min_interval, 0);
        let interval = throttle.interval();

        prop_assert!(interval >= min_interval.max(1));
        if total_known {
            prop_assert!(interval >= total / 100);
        }

        let mut downloaded = 0u64;
        let mut reports = vec![0u64];
        for chunk in &chunks {
            downloaded += chunk;
            if throttle.should_report(downloaded) {
                reports.push(downloaded);
            }
        }
        if throttle.finish(downloaded) {
            reports.push(downloaded);
        }

        prop_assert_eq!(*reports.last().unwrap(), size);
        for pair in reports.windows(2) {
            prop_assert!(pair[0] <= pair[1]);
        }
        // Every report but the final one is at least one interval after the
        // previous report.
        let spaced = &reports[..reports.len() - 1];
        for pair in spaced.windows(2) {
            prop_assert!(pair[1] - pair[0] >= interval);
        }
    }

    #[test]
    fn stripping_ansi_removes_every_escape(
        parts in proptest::collection::vec(("[a-zA-Z0-9 :\\[\\]]{0,12}", 0usize..7), 1..10),
    ) {
        const CODES: [&str; 7] = [
            "\x1b[0m",
            "\x1b[31;1m",
            "\x1b[2K",
            "\x1b[?25l",
            "\x1bM",
            "\x1b]0;warden\x07",
            "\x1b]2;Paper 1.20.4\x1b\\",
        ];

        let mut plain = String::new();
        let mut coloured = String::new();
        for (text, code) in &parts {
            coloured.push_str(CODES[*code]);
            coloured.push_str(text);
            plain.push_str(text);
        }

        let stripped = strip_ansi(&coloured);
        prop_assert_eq!(&*stripped, plain.as_str());
        prop_assert!(!stripped.contains('\x1b'));
        prop_assert_eq!(&*strip_ansi(&plain), plain.as_str());
    }
}
