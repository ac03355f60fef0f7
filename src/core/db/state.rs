use image::DynamicImage;
use sqlx::{
    Sqlite,
    pool::PoolConnection,
    sqlite::{
        SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
    },
};
use tempdir::TempDir;
use tokio::{
    fs as async_fs,
    sync::{RwLock, RwLockReadGuard},
};

use std::{
    fs::{self, File},
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
};
use uuid::Uuid;
use anyhow::Context;

use tar::{Archive, Builder};
use zstd::stream::{read::Decoder as ZstdDecoder, write::Encoder as ZstdEncoder};

const DB_FILE_NAME: &str = "library.db";
const IMAGE_DIR_NAME: &str = "images";
const ZSTD_LEVEL: i32 = 3;

/// An unpacked library: the archive on disk, the scratch directory it was
/// extracted to and a pool over the extracted database.
pub(super) struct LibraryState {
    library_file: PathBuf,
    working_dir: TempDir,
    pool: RwLock<SqlitePool>,
}

impl std::fmt::Debug for LibraryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryState")
            .field("library_file", &self.library_file)
            .field("working_dir", &self.working_dir.path())
            .finish()
    }
}

fn connect_options(db_file: &Path) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(db_file)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
}

async fn open_pool(db_file: &Path) -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options(db_file))
        .await
        .with_context(|| format!("Failed to open library database {:?}", db_file))?;
    Ok(pool)
}

impl LibraryState {
    /// Acquire a pooled connection; the pool read lock is held for as long as
    /// the returned guard lives, so a concurrent save waits for it.
    pub(super) async fn conn(&self) -> anyhow::Result<DbConnGuard<'_>> {
        let pool_guard = self.pool.read().await;
        let conn = pool_guard.acquire().await?;

        Ok(DbConnGuard {
            _pool_guard: pool_guard,
            conn,
        })
    }

    fn image_path(&self, image_fname: &str) -> PathBuf {
        self.working_dir.path().join(IMAGE_DIR_NAME).join(image_fname)
    }

    pub(super) async fn load_image(&self, image_fname: &str) -> anyhow::Result<DynamicImage> {
        let img_path = self.image_path(image_fname);
        let bytes = async_fs::read(&img_path)
            .await
            .with_context(|| format!("Failed to read image {:?}", img_path))?;
        let img = image::load_from_memory(&bytes)
            .with_context(|| format!("Failed to decode image {:?}", img_path))?;
        Ok(img)
    }

    /// Copy an image into the library, returning the stored file name.
    pub(super) async fn store_image<P: AsRef<Path>>(&self, img_path: P) -> anyhow::Result<String> {
        let img_path = img_path.as_ref();
        let ext = img_path
            .extension()
            .and_then(|ext| ext.to_str())
            .with_context(|| format!("Image path {:?} has no usable extension", img_path))?;
        // Reject anything the image crate cannot read before it lands in the archive.
        image::ImageFormat::from_extension(ext)
            .with_context(|| format!("Unsupported image type {:?}", img_path))?;

        let img_fname = format!("{}.{}", Uuid::new_v4(), ext.to_lowercase());
        let dest_path = self.image_path(&img_fname);
        async_fs::copy(img_path, &dest_path)
            .await
            .with_context(|| format!(
                "Failed to copy image from {:?} to {:?}",
                img_path,
                dest_path
            ))?;
        Ok(img_fname)
    }

    pub(super) async fn delete_image(&self, image_fname: &str) -> anyhow::Result<()> {
        let img_path = self.image_path(image_fname);
        async_fs::remove_file(&img_path)
            .await
            .with_context(|| format!("Failed to delete image {:?}", img_path))?;
        Ok(())
    }

    /// Pack the working directory into the library archive.
    fn save_tar_zstd(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.library_file.parent() {
            fs::create_dir_all(parent)?;
        }

        let out = File::create(&self.library_file)
            .with_context(|| format!("Failed to create library archive {:?}", self.library_file))?;
        let encoder = ZstdEncoder::new(out, ZSTD_LEVEL)
            .with_context(|| format!("Failed to create zstd encoder for {:?}", self.library_file))?;
        let mut tar = Builder::new(encoder);

        tar.append_dir_all(".", self.working_dir.path())
            .with_context(|| format!("Failed to add {:?} to tar", self.working_dir.path()))?;

        let encoder = tar.into_inner()
            .with_context(|| format!("Failed to finalize tar for {:?}", self.library_file))?;
        encoder.finish()
            .with_context(|| format!("Failed to finalize zstd stream for {:?}", self.library_file))?;

        Ok(())
    }

    pub(super) async fn save_library(&self) -> anyhow::Result<()> {
        self.internal_close_and_pack(true).await
    }

    /// Exclusive close+pack:
    /// - waits for every outstanding connection guard (takes the WRITE lock)
    /// - checkpoints the WAL so library.db is current
    /// - closes the pool to release file handles
    /// - archives the working dir, then optionally reopens
    pub(super) async fn internal_close_and_pack(&self, reopen: bool) -> anyhow::Result<()> {
        let mut pool_guard = self.pool.write().await;

        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE);")
            .execute(&*pool_guard)
            .await?;
        pool_guard.close().await;

        self.save_tar_zstd()?;
        tracing::info!(library = ?self.library_file, "library saved");

        if reopen {
            let db_file = self.working_dir.path().join(DB_FILE_NAME);
            *pool_guard = open_pool(&db_file).await?;
        }
        Ok(())
    }

    pub(super) async fn new<P: AsRef<Path>>(library_file: P) -> anyhow::Result<Self> {
        let library_file = library_file.as_ref().to_path_buf();

        // A missing library becomes an empty archive, provided its directory exists.
        if !library_file.is_file() {
            if library_file.parent().map(|p| p.is_dir()).unwrap_or(false) {
                let out = File::create(&library_file)
                    .with_context(|| format!("Failed to create library archive {:?}", library_file))?;
                let encoder = ZstdEncoder::new(out, ZSTD_LEVEL)
                    .with_context(|| format!("Failed to create zstd encoder for {:?}", library_file))?;
                let tar = Builder::new(encoder);
                let encoder = tar.into_inner()
                    .with_context(|| format!("Failed to finalize empty tar {:?}", library_file))?;
                encoder.finish()
                    .with_context(|| format!("Failed to finalize empty zstd stream {:?}", library_file))?;
                tracing::info!(library = ?library_file, "created new library");
            } else {
                anyhow::bail!("Library file parent does not exist: {:?}", library_file);
            }
        }

        let working_dir = TempDir::new("dpstash_library")?;
        {
            let f = File::open(&library_file)
                .with_context(|| format!("Failed to open library archive {:?}", library_file))?;
            let decoder = ZstdDecoder::new(f)
                .with_context(|| format!("Invalid zstd stream in {:?}", library_file))?;
            let mut archive = Archive::new(decoder);
            archive.unpack(working_dir.path())
                .with_context(|| format!(
                    "Failed to extract archive {:?} into {:?}",
                    library_file,
                    working_dir.path()
                ))?;
        }

        let db_file = working_dir.path().join(DB_FILE_NAME);
        let images_dir = working_dir.path().join(IMAGE_DIR_NAME);

        match (db_file.is_file(), images_dir.is_dir()) {
            (true, true) => {}
            (false, false) => {
                fs::create_dir_all(&images_dir)?;
                File::create(&db_file)?;
            }
            (true, false) => anyhow::bail!(
                "Corrupt library: database exists ({:?}) but images dir missing ({:?})",
                db_file,
                images_dir
            ),
            (false, true) => anyhow::bail!(
                "Corrupt library: images dir exists ({:?}) but database missing ({:?})",
                images_dir,
                db_file
            ),
        }

        let pool = open_pool(&db_file).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::debug!(library = ?library_file, working_dir = ?working_dir.path(), "library opened");
        Ok(Self {
            library_file,
            working_dir,
            pool: RwLock::new(pool),
        })
    }
}

pub(super) struct DbConnGuard<'a> {
    _pool_guard: RwLockReadGuard<'a, SqlitePool>,
    conn: PoolConnection<Sqlite>,
}

impl<'a> Deref for DbConnGuard<'a> {
    type Target = PoolConnection<Sqlite>;
    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl<'a> DerefMut for DbConnGuard<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl Drop for LibraryState {
    fn drop(&mut self) {
        // Inside a runtime we cannot block on the save; callers there must
        // call save_library() themselves.
        if tokio::runtime::Handle::try_current().is_ok() {
            tracing::debug!(library = ?self.library_file, "dropped inside runtime, skipping save");
            return;
        }
        let result = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt.block_on(self.internal_close_and_pack(false)),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            tracing::warn!(library = ?self.library_file, error = %e, "failed to save library on drop");
        }
    }
}
