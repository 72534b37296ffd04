//! Wizard integration tests, driven through an in-memory service.
//!
//! The fake generator is wrapped in the real `GeneratorService`, so these also
//! exercise the concurrent fan-out and its all-or-nothing failure rule.

use colorbook::pipeline::encode::encode_png;
use colorbook::{
    ColoringConfig, ColoringError, ColoringService, Consent, ConversionRequest, CropRect,
    CropRegion, Difficulty, EncodedImage, GeneratorService, PageGenerator, Style, Wizard,
    WizardState,
};
use futures::future::BoxFuture;
use image::{DynamicImage, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Echoes each crop back as its "coloring page". A request with notes gets a
/// fresh 1×1 page instead, so regenerated items are easy to spot.
#[derive(Default)]
struct FakeModel {
    calls: AtomicUsize,
    fail_on_call: Option<usize>,
    notes_seen: Mutex<Vec<String>>,
}

impl PageGenerator for FakeModel {
    fn generate<'a>(
        &'a self,
        request: &'a ConversionRequest,
    ) -> BoxFuture<'a, Result<EncodedImage, ColoringError>> {
        Box::pin(async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on_call == Some(call) {
                return Err(ColoringError::ConversionFailure {
                    message: "model returned no image".into(),
                });
            }
            match request.notes {
                Some(ref notes) => {
                    self.notes_seen.lock().unwrap().push(notes.clone());
                    encode_png(&DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                        1,
                        1,
                        Rgba([0, 0, 0, 255]),
                    )))
                }
                None => Ok(request.image.clone()),
            }
        })
    }
}

fn photo(width: u32, height: u32, seed: u8) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 251) as u8, (y % 241) as u8, seed, 255])
    })
}

fn png_bytes(img: &RgbaImage) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(img.clone())
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

fn wizard_with(model: Arc<FakeModel>) -> Wizard {
    let config = ColoringConfig::default();
    let service: Arc<dyn ColoringService> = Arc::new(GeneratorService::new(model, config.clone()));
    Wizard::new(service, config)
}

const ALL_IN: Consent = Consent {
    owns_rights: true,
    accepts_terms: true,
};

/// Upload `n` small photos and crop each at the default region.
fn ready_to_convert(wizard: &mut Wizard, n: u8) {
    let files: Vec<_> = (0..n)
        .map(|i| (format!("photo-{i}.png"), png_bytes(&photo(17, 22, i))))
        .collect();
    wizard.add_files(files).unwrap();
    wizard.start_cropping().unwrap();
    while let WizardState::Cropping(_) = wizard.state() {
        wizard.confirm_crop(CropRegion::default()).unwrap();
    }
    if wizard.state() == WizardState::AwaitingConsent {
        wizard.acknowledge(ALL_IN).unwrap();
    }
    assert_eq!(wizard.state(), WizardState::Converting);
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn three_letter_pages_pass_through_unchanged() {
    let model = Arc::new(FakeModel::default());
    let mut wizard = wizard_with(model.clone());
    let photos: Vec<RgbaImage> = (0..3).map(|i| photo(850, 1100, i * 40)).collect();

    wizard
        .add_files(photos.iter().enumerate().map(|(i, p)| (format!("p{i}.png"), png_bytes(p))))
        .unwrap();
    wizard.start_cropping().unwrap();
    for i in 0..3 {
        assert_eq!(wizard.state(), WizardState::Cropping(i));
        wizard
            .confirm_crop_rect(0.0, CropRect::new(0, 0, 850, 1100))
            .unwrap();
    }
    assert_eq!(wizard.state(), WizardState::AwaitingConsent);
    wizard.acknowledge(ALL_IN).unwrap();

    for (crop, original) in wizard.crops().iter().zip(&photos) {
        let decoded = crop.decode_image().unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (850, 1100));
        assert_eq!(&decoded, original);
    }

    wizard.convert().await.unwrap();
    assert_eq!(wizard.state(), WizardState::Reviewing);
    assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    let items = wizard.gallery().items();
    assert_eq!(items.len(), 3);
    for (item, original) in items.iter().zip(&photos) {
        assert_eq!(&item.original.decode_image().unwrap().to_rgba8(), original);
        assert_eq!(item.converted, item.original);
    }
}

#[test]
fn default_region_on_a_letter_photo_is_the_whole_photo() {
    let mut wizard = wizard_with(Arc::new(FakeModel::default()));
    let original = photo(850, 1100, 7);
    wizard.add_files(vec![("letter.png", png_bytes(&original))]).unwrap();
    wizard.start_cropping().unwrap();
    wizard.confirm_crop(CropRegion::default()).unwrap();
    assert_eq!(wizard.crops()[0].decode_image().unwrap().to_rgba8(), original);
}

#[tokio::test]
async fn regenerating_one_page_leaves_the_others_alone() {
    let model = Arc::new(FakeModel::default());
    let mut wizard = wizard_with(model.clone());
    ready_to_convert(&mut wizard, 3);
    wizard.convert().await.unwrap();
    let before = wizard.gallery().items().to_vec();

    wizard.regenerate(1, Some("thicker lines")).await.unwrap();

    let after = wizard.gallery().items();
    assert_eq!(after[0], before[0]);
    assert_eq!(after[2], before[2]);
    assert_eq!(after[1].original, before[1].original);
    assert_ne!(after[1].converted, before[1].converted);
    assert_eq!(model.notes_seen.lock().unwrap().as_slice(), &["thicker lines".to_string()]);
    assert_eq!(wizard.state(), WizardState::Reviewing);
}

#[tokio::test]
async fn one_failed_image_discards_the_whole_batch() {
    let model = Arc::new(FakeModel {
        fail_on_call: Some(2),
        ..FakeModel::default()
    });
    let mut wizard = wizard_with(model);
    ready_to_convert(&mut wizard, 3);

    let err = wizard.convert().await.unwrap_err();
    assert!(matches!(err, ColoringError::ConversionFailure { .. }));
    assert_eq!(wizard.state(), WizardState::Idle);
    assert!(wizard.gallery().is_empty());
    assert!(wizard.crops().is_empty());
    assert!(wizard.uploader().is_empty());
    assert_eq!(wizard.uploader().previews().live_count(), 0);
}

/// A batch service that loses the last page of every batch.
struct DropsLastPage;

impl ColoringService for DropsLastPage {
    fn convert_batch<'a>(
        &'a self,
        images: &'a [EncodedImage],
        _style: Style,
        _difficulty: Difficulty,
    ) -> BoxFuture<'a, Result<Vec<EncodedImage>, ColoringError>> {
        let kept = images[..images.len().saturating_sub(1)].to_vec();
        Box::pin(async move { Ok(kept) })
    }

    fn regenerate_one<'a>(
        &'a self,
        image: &'a EncodedImage,
        _style: Style,
        _difficulty: Difficulty,
        _notes: Option<&'a str>,
    ) -> BoxFuture<'a, Result<EncodedImage, ColoringError>> {
        Box::pin(async move { Ok(image.clone()) })
    }
}

#[tokio::test]
async fn short_batch_reply_is_never_accepted() {
    let mut wizard = Wizard::new(Arc::new(DropsLastPage), ColoringConfig::default());
    ready_to_convert(&mut wizard, 3);

    let err = wizard.convert().await.unwrap_err();
    assert!(
        matches!(err, ColoringError::CountMismatch { expected: 3, actual: 2 }),
        "got {err:?}"
    );
    assert_eq!(wizard.state(), WizardState::Idle);
    assert!(wizard.gallery().is_empty());
    assert!(wizard.crops().is_empty());
    assert!(wizard.uploader().is_empty());
    assert_eq!(wizard.uploader().previews().live_count(), 0);
}

#[tokio::test]
async fn failed_regeneration_keeps_the_gallery() {
    let model = Arc::new(FakeModel {
        fail_on_call: Some(3),
        ..FakeModel::default()
    });
    let mut wizard = wizard_with(model);
    ready_to_convert(&mut wizard, 2);
    wizard.convert().await.unwrap();
    let before = wizard.gallery().items().to_vec();

    assert!(wizard.regenerate(0, Some("more contrast")).await.is_err());
    assert_eq!(wizard.gallery().items(), before.as_slice());
    assert_eq!(wizard.state(), WizardState::Reviewing);

    let err = wizard.regenerate(9, None).await.unwrap_err();
    assert!(matches!(err, ColoringError::ItemNotFound { index: 9, len: 2 }));
}

#[test]
fn removing_an_upload_twice_releases_once() {
    let mut wizard = wizard_with(Arc::new(FakeModel::default()));
    let ids = wizard
        .add_files(vec![
            ("a.png", png_bytes(&photo(5, 5, 1))),
            ("b.png", png_bytes(&photo(5, 5, 2))),
        ])
        .unwrap();

    assert!(wizard.remove_file(ids[0]).unwrap());
    assert!(!wizard.remove_file(ids[0]).unwrap());
    assert_eq!(wizard.uploader().previews().revoked_count(), 1);
    assert_eq!(wizard.uploader().previews().live_count(), 1);
    assert_eq!(wizard.state(), WizardState::Uploading);
}

#[test]
fn non_images_are_skipped_on_upload() {
    let mut wizard = wizard_with(Arc::new(FakeModel::default()));
    let ids = wizard
        .add_files(vec![
            ("notes.txt", b"not a photo".to_vec()),
            ("a.png", png_bytes(&photo(5, 5, 1))),
        ])
        .unwrap();
    assert_eq!(ids.len(), 1);
    assert_eq!(wizard.uploader().len(), 1);
}

#[test]
fn consent_gate_needs_both_acknowledgements() {
    let mut wizard = wizard_with(Arc::new(FakeModel::default()));
    wizard
        .add_files((0..2).map(|i| (format!("{i}.png"), png_bytes(&photo(9, 9, i)))))
        .unwrap();
    wizard.start_cropping().unwrap();
    wizard.confirm_crop(CropRegion::default()).unwrap();
    wizard.confirm_crop(CropRegion::default()).unwrap();
    assert_eq!(wizard.state(), WizardState::AwaitingConsent);

    let half = Consent {
        owns_rights: true,
        accepts_terms: false,
    };
    assert!(matches!(wizard.acknowledge(half), Err(ColoringError::ConsentIncomplete)));
    assert_eq!(wizard.state(), WizardState::AwaitingConsent);

    wizard.decline_consent().unwrap();
    assert_eq!(wizard.state(), WizardState::Cropping(1));
    assert_eq!(wizard.crops().len(), 1);

    wizard.confirm_crop(CropRegion::default().with_rotation(90.0)).unwrap();
    wizard.acknowledge(ALL_IN).unwrap();
    assert_eq!(wizard.state(), WizardState::Converting);
}

#[test]
fn rotated_crop_is_fitted_to_the_page() {
    let mut wizard = wizard_with(Arc::new(FakeModel::default()));
    wizard
        .add_files(vec![("wide.png", png_bytes(&photo(1100, 850, 3)))])
        .unwrap();
    wizard.start_cropping().unwrap();
    let mut region = CropRegion::default();
    region.rotate_clockwise();
    wizard.confirm_crop(region).unwrap();
    let crop = wizard.crops()[0].decode_image().unwrap();
    assert_eq!((crop.width(), crop.height()), (850, 1100));
}

#[tokio::test]
async fn adding_more_photos_appends_to_the_book() {
    let mut wizard = wizard_with(Arc::new(FakeModel::default()));
    ready_to_convert(&mut wizard, 2);
    wizard.convert().await.unwrap();
    let first_batch = wizard.gallery().items().to_vec();

    let ids = wizard
        .add_more_photos(vec![("more.png", png_bytes(&photo(12, 12, 99)))])
        .unwrap();
    assert_eq!(ids.len(), 1);
    assert_eq!(wizard.state(), WizardState::Cropping(0));
    assert!(wizard.is_adding_more());

    // Consent was already given this session.
    assert_eq!(wizard.confirm_crop(CropRegion::default()).unwrap(), WizardState::Converting);
    wizard.convert().await.unwrap();

    let items = wizard.gallery().items();
    assert_eq!(items.len(), 3);
    assert_eq!(&items[..2], first_batch.as_slice());
    assert!(!wizard.is_adding_more());
}

#[tokio::test]
async fn failure_while_adding_more_resets_everything() {
    let model = Arc::new(FakeModel {
        fail_on_call: Some(3),
        ..FakeModel::default()
    });
    let mut wizard = wizard_with(model);
    ready_to_convert(&mut wizard, 2);
    wizard.convert().await.unwrap();

    wizard
        .add_more_photos(vec![("more.png", png_bytes(&photo(12, 12, 1)))])
        .unwrap();
    wizard.confirm_crop(CropRegion::default()).unwrap();
    assert!(wizard.convert().await.is_err());
    assert_eq!(wizard.state(), WizardState::Idle);
    assert!(wizard.gallery().is_empty());
}

#[tokio::test]
async fn back_to_gallery_abandons_the_second_batch() {
    let mut wizard = wizard_with(Arc::new(FakeModel::default()));
    ready_to_convert(&mut wizard, 1);
    wizard.convert().await.unwrap();

    wizard
        .add_more_photos(vec![("more.png", png_bytes(&photo(12, 12, 1)))])
        .unwrap();
    wizard.back_to_gallery().unwrap();
    assert_eq!(wizard.state(), WizardState::Reviewing);
    assert_eq!(wizard.gallery().len(), 1);
    assert_eq!(wizard.uploader().previews().live_count(), 0);
}

#[test]
fn reset_releases_everything_from_any_state() {
    let mut wizard = wizard_with(Arc::new(FakeModel::default()));
    wizard
        .add_files((0..3).map(|i| (format!("{i}.png"), png_bytes(&photo(6, 6, i)))))
        .unwrap();
    wizard.start_cropping().unwrap();
    wizard.confirm_crop(CropRegion::default()).unwrap();

    wizard.reset();
    assert_eq!(wizard.state(), WizardState::Idle);
    assert!(wizard.crops().is_empty());
    assert_eq!(wizard.uploader().previews().live_count(), 0);
    assert_eq!(wizard.uploader().previews().revoked_count(), 3);
}

#[tokio::test]
async fn wrong_state_calls_are_rejected() {
    let mut wizard = wizard_with(Arc::new(FakeModel::default()));
    assert!(matches!(
        wizard.convert().await,
        Err(ColoringError::InvalidTransition { .. })
    ));
    assert!(matches!(
        wizard.confirm_crop(CropRegion::default()),
        Err(ColoringError::InvalidTransition { .. })
    ));
    assert!(wizard.add_more_photos(Vec::<(String, Vec<u8>)>::new()).is_err());
    assert!(wizard.back_to_gallery().is_err());

    ready_to_convert(&mut wizard, 1);
    assert!(matches!(
        wizard.add_files(vec![("x.png", png_bytes(&photo(3, 3, 0)))]),
        Err(ColoringError::InvalidTransition { .. })
    ));
    assert_eq!(wizard.state(), WizardState::Converting);
}
