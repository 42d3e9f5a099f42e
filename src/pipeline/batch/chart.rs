//! PNG bar rendering of a statistics histogram.
//!
//! Plain bars on a white canvas with a baseline and a left axis; no labels.

use std::io::Cursor;

use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use thiserror::Error;

use super::statistics::AggregateStatistics;

pub const CHART_WIDTH: u32 = 640;
pub const CHART_HEIGHT: u32 = 400;
const MARGIN: u32 = 32;
/// Gap between adjacent bars, in pixels.
const BAR_GAP: u32 = 2;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([40, 40, 40]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);
const BAR: Rgb<u8> = Rgb([54, 110, 178]);

#[derive(Error, Debug)]
pub enum ChartError {
    #[error("PNG encoding failed: {0}")]
    Encoding(#[from] image::ImageError),
}

/// Render the histogram of `stats` as a PNG.
pub fn render_histogram_png(stats: &AggregateStatistics) -> Result<Vec<u8>, ChartError> {
    let img = draw_histogram(stats);
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img).write_to(&mut cursor, ImageOutputFormat::Png)?;
    Ok(cursor.into_inner())
}

fn draw_histogram(stats: &AggregateStatistics) -> RgbImage {
    let mut img = RgbImage::from_pixel(CHART_WIDTH, CHART_HEIGHT, BACKGROUND);

    let left = MARGIN;
    let right = CHART_WIDTH - MARGIN;
    let top = MARGIN;
    let baseline = CHART_HEIGHT - MARGIN;
    let plot_height = baseline - top;

    // Horizontal grid at quarter heights
    for quarter in 1..=4 {
        let y = baseline - plot_height * quarter / 4;
        fill_rect(&mut img, left, y, right, y + 1, GRID);
    }

    let tallest = stats.buckets.iter().map(|b| b.count).max().unwrap_or(0);
    let bins = stats.buckets.len() as u32;
    if tallest > 0 && bins > 0 {
        let slot = (right - left) / bins;
        for (i, bucket) in stats.buckets.iter().enumerate() {
            if bucket.count == 0 {
                continue;
            }
            let height = ((bucket.count as u64 * plot_height as u64) / tallest as u64) as u32;
            let x0 = left + slot * i as u32 + BAR_GAP / 2;
            let x1 = (x0 + slot).saturating_sub(BAR_GAP).max(x0 + 1);
            fill_rect(&mut img, x0, baseline - height.max(1), x1, baseline, BAR);
        }
    }

    fill_rect(&mut img, left, baseline, right, baseline + 1, AXIS);
    fill_rect(&mut img, left - 1, top, left, baseline + 1, AXIS);
    img
}

/// Fill `[x0, x1) × [y0, y1)`, clipped to the image.
fn fill_rect(img: &mut RgbImage, x0: u32, y0: u32, x1: u32, y1: u32, color: Rgb<u8>) {
    let x1 = x1.min(img.width());
    let y1 = y1.min(img.height());
    for y in y0..y1 {
        for x in x0..x1 {
            img.put_pixel(x, y, color);
        }
    }
}
