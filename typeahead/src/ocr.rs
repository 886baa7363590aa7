//! Groups word/line-level OCR observations into reading-order paragraphs.

use crate::errors::AutomationError;
use crate::geometry::Rect;
use crate::ScreenshotResult;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::debug;

/// Horizontal expansion applied to each box before overlap testing (normalized units).
pub const THRESHOLD_X: f64 = 0.01;
/// Vertical expansion applied to each box before overlap testing (normalized units).
pub const THRESHOLD_Y: f64 = 0.02;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedText {
    pub text: String,
    pub confidence: f32,
}

/// One detection from the recognizer. Boxes are normalized to `[0, 1]²`
/// with the origin at the bottom-left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextObservation {
    pub bounding_box: Rect,
    /// Candidates ranked by confidence, best first.
    pub candidates: Vec<RecognizedText>,
}

impl TextObservation {
    pub fn new(bounding_box: Rect, text: impl Into<String>) -> Self {
        Self {
            bounding_box,
            candidates: vec![RecognizedText {
                text: text.into(),
                confidence: 1.0,
            }],
        }
    }

    pub fn top_candidate(&self) -> &str {
        self.candidates
            .first()
            .map(|c| c.text.as_str())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRegion {
    pub bounding_box: Rect,
    pub text: String,
}

/// Top-to-bottom (descending y), then left-to-right.
fn reading_order(a: &Rect, b: &Rect) -> Ordering {
    b.min_y()
        .total_cmp(&a.min_y())
        .then_with(|| a.min_x().total_cmp(&b.min_x()))
}

/// Orders the members of one region. Boxes are banded into lines first (a box
/// joins the current line when its vertical center lies within half the line
/// height of the line's first box), lines run top to bottom, and each line
/// reads left to right.
fn order_members(members: &mut Vec<&TextObservation>) {
    members.sort_by(|a, b| {
        b.bounding_box
            .center()
            .y
            .total_cmp(&a.bounding_box.center().y)
            .then_with(|| a.bounding_box.min_x().total_cmp(&b.bounding_box.min_x()))
    });

    let mut lines: Vec<Vec<&TextObservation>> = Vec::new();
    for member in members.drain(..) {
        let center = member.bounding_box.center().y;
        match lines.last_mut() {
            Some(line)
                if line[0].bounding_box.center().y - center
                    <= line[0].bounding_box.size.height / 2.0 =>
            {
                line.push(member)
            }
            _ => lines.push(vec![member]),
        }
    }

    for mut line in lines {
        line.sort_by(|a, b| a.bounding_box.min_x().total_cmp(&b.bounding_box.min_x()));
        members.extend(line);
    }
}

/// Merges observations whose inset-expanded boxes intersect, transitively.
///
/// Each resulting region spans the union of its members' original boxes and
/// joins their texts with a single space in reading order. Regions are sorted
/// by descending y, then ascending x.
pub fn group_text_regions(observations: &[TextObservation]) -> Vec<TextRegion> {
    if observations.is_empty() {
        return Vec::new();
    }

    let expanded: Vec<Rect> = observations
        .iter()
        .map(|o| o.bounding_box.inset_by(-THRESHOLD_X, -THRESHOLD_Y))
        .collect();

    let mut sets: Vec<BTreeSet<usize>> = (0..expanded.len())
        .map(|i| {
            let mut set = BTreeSet::from([i]);
            for (j, other) in expanded.iter().enumerate() {
                if i != j && expanded[i].intersects(other) {
                    set.insert(j);
                }
            }
            set
        })
        .collect();

    // Merge any two sets sharing an index until nothing changes.
    loop {
        let mut merged = false;
        'outer: for i in 0..sets.len() {
            for j in (i + 1)..sets.len() {
                if !sets[i].is_disjoint(&sets[j]) {
                    let absorbed = sets.swap_remove(j);
                    sets[i].extend(absorbed);
                    merged = true;
                    break 'outer;
                }
            }
        }
        if !merged {
            break;
        }
    }

    let mut regions: Vec<TextRegion> = sets
        .into_iter()
        .map(|set| {
            let mut members: Vec<&TextObservation> =
                set.iter().map(|&i| &observations[i]).collect();
            order_members(&mut members);

            let bounding_box = members
                .iter()
                .skip(1)
                .fold(members[0].bounding_box, |acc, m| acc.union(&m.bounding_box));
            let text = members
                .iter()
                .map(|m| m.top_candidate())
                .collect::<Vec<_>>()
                .join(" ");
            TextRegion { bounding_box, text }
        })
        .collect();

    regions.sort_by(|a, b| reading_order(&a.bounding_box, &b.bounding_box));
    debug!(
        "Grouped {} observations into {} regions",
        observations.len(),
        regions.len()
    );
    regions
}

/// External text recognizer.
#[async_trait::async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(
        &self,
        image: &ScreenshotResult,
    ) -> Result<Vec<TextObservation>, AutomationError>;
}

/// Runs the recognizer and returns one line per grouped region.
pub async fn recognize_text(
    engine: &dyn OcrEngine,
    image: &ScreenshotResult,
) -> Result<String, AutomationError> {
    let observations = engine.recognize(image).await?;
    Ok(group_text_regions(&observations)
        .into_iter()
        .map(|region| region.text)
        .collect::<Vec<_>>()
        .join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn obs(x: f64, y: f64, w: f64, h: f64, text: &str) -> TextObservation {
        TextObservation::new(Rect::new(x, y, w, h), text)
    }

    #[test]
    fn empty_input_yields_no_regions() {
        assert!(group_text_regions(&[]).is_empty());
    }

    #[test]
    fn hello_world_merge_and_far_stays_alone() {
        let regions = group_text_regions(&[
            obs(0.0, 0.0, 10.0, 10.0, "Hello"),
            obs(9.0, 1.0, 10.0, 10.0, "World"),
            obs(100.0, 100.0, 5.0, 5.0, "Far"),
        ]);

        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].text, "Far");
        assert_eq!(regions[1].text, "Hello World");
        assert_eq!(regions[1].bounding_box, Rect::new(0.0, 0.0, 19.0, 11.0));
    }

    #[test]
    fn same_line_words_read_left_to_right() {
        let regions = group_text_regions(&[
            obs(0.30, 0.50, 0.10, 0.04, "world"),
            obs(0.10, 0.50, 0.195, 0.04, "hello"),
        ]);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].text, "hello world");
    }

    #[test]
    fn slightly_lower_words_on_the_same_line_still_read_left_to_right() {
        // "before" sits 0.01 lower than "after", well within half a line height.
        let regions = group_text_regions(&[
            obs(0.30, 0.50, 0.10, 0.04, "after"),
            obs(0.19, 0.49, 0.10, 0.04, "before"),
        ]);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].text, "before after");
    }

    #[test]
    fn stacked_words_in_one_region_read_top_down() {
        let regions = group_text_regions(&[
            obs(0.10, 0.50, 0.10, 0.04, "second"),
            obs(0.12, 0.545, 0.10, 0.04, "first"),
        ]);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].text, "first second");
    }

    #[test]
    fn chained_overlaps_merge_transitively() {
        // a touches b, b touches c, a and c are far apart.
        let regions = group_text_regions(&[
            obs(0.00, 0.5, 0.10, 0.02, "a"),
            obs(0.11, 0.5, 0.10, 0.02, "b"),
            obs(0.22, 0.5, 0.10, 0.02, "c"),
        ]);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].text, "a b c");
    }

    #[test]
    fn lines_far_apart_stay_separate_and_top_comes_first() {
        let regions = group_text_regions(&[
            obs(0.1, 0.1, 0.2, 0.02, "bottom"),
            obs(0.1, 0.8, 0.2, 0.02, "top"),
        ]);
        let texts: Vec<&str> = regions.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["top", "bottom"]);
    }

    /// Clusters of overlapping words placed on a coarse grid so clusters never touch.
    fn random_clusters(rng: &mut StdRng) -> (Vec<TextObservation>, usize) {
        let mut observations = Vec::new();
        let mut cells: Vec<(usize, usize)> = (0..4)
            .flat_map(|row| (0..4).map(move |col| (row, col)))
            .collect();
        let clusters = rng.gen_range(1..=6);
        let mut used = 0;
        for n in 0..clusters {
            let idx = rng.gen_range(0..cells.len());
            let (row, col) = cells.swap_remove(idx);
            let base_x = col as f64 * 0.25 + 0.02;
            let base_y = row as f64 * 0.25 + 0.02;
            let words = rng.gen_range(1..=4);
            for w in 0..words {
                observations.push(obs(
                    base_x + w as f64 * 0.04,
                    base_y + rng.gen_range(0.0..0.01),
                    0.035,
                    0.02,
                    &format!("c{n}w{w}"),
                ));
            }
            used += 1;
        }
        // Shuffle so input order carries no information.
        for i in (1..observations.len()).rev() {
            let j = rng.gen_range(0..=i);
            observations.swap(i, j);
        }
        (observations, used)
    }

    #[test]
    fn seeded_random_clusters_group_order_and_regroup_stably() {
        let mut rng = StdRng::seed_from_u64(0x7e57_0c12);
        for _ in 0..200 {
            let (observations, clusters) = random_clusters(&mut rng);
            let regions = group_text_regions(&observations);
            assert_eq!(regions.len(), clusters);
            for region in &regions {
                let words: Vec<&str> = region.text.split(' ').collect();
                let mut sorted = words.clone();
                sorted.sort();
                assert_eq!(words, sorted, "words of a line read left to right");
            }

            for pair in regions.windows(2) {
                let (a, b) = (&pair[0].bounding_box, &pair[1].bounding_box);
                assert!(
                    a.min_y() > b.min_y() || (a.min_y() == b.min_y() && a.min_x() <= b.min_x()),
                    "regions out of reading order: {a:?} before {b:?}"
                );
            }

            // Every pair that overlaps after expansion shares a region.
            for a in &observations {
                for b in &observations {
                    let ea = a.bounding_box.inset_by(-THRESHOLD_X, -THRESHOLD_Y);
                    let eb = b.bounding_box.inset_by(-THRESHOLD_X, -THRESHOLD_Y);
                    if ea.intersects(&eb) {
                        let holder = |o: &TextObservation| {
                            regions
                                .iter()
                                .position(|r| r.text.split(' ').any(|t| t == o.top_candidate()))
                        };
                        assert_eq!(holder(a), holder(b));
                    }
                }
            }

            let regrouped_input: Vec<TextObservation> = regions
                .iter()
                .map(|r| TextObservation::new(r.bounding_box, r.text.clone()))
                .collect();
            assert_eq!(group_text_regions(&regrouped_input), regions);
        }
    }

    struct FixedEngine(Vec<TextObservation>);

    #[async_trait::async_trait]
    impl OcrEngine for FixedEngine {
        async fn recognize(
            &self,
            _image: &ScreenshotResult,
        ) -> Result<Vec<TextObservation>, AutomationError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn recognize_text_joins_regions_with_newlines() {
        let engine = FixedEngine(vec![
            obs(0.1, 0.1, 0.2, 0.02, "second"),
            obs(0.1, 0.8, 0.2, 0.02, "first"),
        ]);
        let image = ScreenshotResult {
            image_data: vec![],
            width: 0,
            height: 0,
        };
        assert_eq!(
            recognize_text(&engine, &image).await.unwrap(),
            "first\nsecond"
        );
    }
}
