use dpstash::core::db::{LibraryDb, NewProject, ProjectStatus, UserDb, UserRepository};
use image::{ImageBuffer, Rgb};
use tempfile::NamedTempFile;
use time::Date;

/// Creates a 100x100 red test image and returns the temp file.
/// The file will be automatically cleaned up when dropped.
pub fn create_test_image() -> NamedTempFile {
    let img = ImageBuffer::from_fn(100, 100, |_, _| Rgb([255u8, 0u8, 0u8]));
    let file = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .expect("Failed to create temp image file");
    img.save_with_format(file.path(), image::ImageFormat::Png)
        .expect("Failed to save test image");
    file
}

/// Creates a LibraryDb backed by a temporary tar.zst file.
/// Returns both the library and the temp directory (which must be kept alive).
pub async fn create_test_library() -> (LibraryDb, tempfile::TempDir) {
    let dir = tempfile::TempDir::new().expect("Failed to create temp directory");
    let path = dir.path().join("test.dpstash");
    let library = LibraryDb::new(&path)
        .await
        .expect("Failed to create test library");
    (library, dir)
}

/// Creates a library with a single user and returns that user's repository.
pub async fn create_test_user_library() -> (LibraryDb, UserDb, tempfile::TempDir) {
    let (library, dir) = create_test_library().await;
    let user = library
        .add_user("alice")
        .await
        .expect("Failed to create test user");
    (library, user, dir)
}

/// A project with only a title and status set.
pub fn make_new_project(title: &str, status: ProjectStatus) -> NewProject {
    NewProject {
        title: title.to_string(),
        status,
        ..Default::default()
    }
}

/// A project completed on `date` with `diamonds` drills.
pub fn make_completed_project(title: &str, date: Date, diamonds: u64) -> NewProject {
    NewProject {
        title: title.to_string(),
        status: ProjectStatus::Completed,
        total_diamonds: Some(diamonds),
        date_started: Some(date),
        date_completed: Some(date),
        ..Default::default()
    }
}
