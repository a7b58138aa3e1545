use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender};

use crate::camera::domain::camera_frame::CameraFrame;
use crate::camera::domain::frame_sink::FrameSink;
use crate::camera::domain::still_camera::{CaptureCallback, CaptureError, StillCamera};
use crate::shared::frame::{Frame, Rotation};

/// Plays decoded still images as a live camera feed.
///
/// A delivery thread hands one [`CameraFrame`] at a time to a
/// [`FrameSink`] at a fixed frame rate, all tagged with the same sensor
/// rotation. `take_picture` captures whatever was shown last. Released
/// frames are counted so callers can check nothing leaks.
pub struct ImageSequenceCamera {
    images: Arc<Vec<Frame>>,
    rotation: Rotation,
    interval: Duration,
    looping: bool,
    latest: Arc<Mutex<Option<Frame>>>,
    delivered: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
    stopped: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    stop_tx: Option<Sender<()>>,
    feed: Option<JoinHandle<()>>,
}

impl ImageSequenceCamera {
    /// `fps <= 0` delivers frames back to back.
    pub fn new(images: Vec<Frame>, rotation: Rotation, fps: f64) -> Self {
        let interval = if fps.is_finite() && fps > 0.0 {
            Duration::from_secs_f64(1.0 / fps)
        } else {
            Duration::ZERO
        };
        Self {
            images: Arc::new(images),
            rotation,
            interval,
            looping: false,
            latest: Arc::new(Mutex::new(None)),
            delivered: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicUsize::new(0)),
            stopped: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
            feed: None,
        }
    }

    /// Decodes every path into an RGB frame, in order.
    pub fn open<P: AsRef<Path>>(paths: &[P], rotation: Rotation, fps: f64) -> Result<Self, CaptureError> {
        let images = paths
            .iter()
            .enumerate()
            .map(|(i, p)| decode_rgb(p.as_ref(), i))
            .collect::<Result<Vec<_>, _>>()?;
        if images.is_empty() {
            return Err(CaptureError::NoFrame);
        }
        log::info!("Loaded {} image(s) for playback", images.len());
        Ok(Self::new(images, rotation, fps))
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Starts delivering frames to `sink` on a dedicated thread.
    pub fn start(&mut self, sink: Arc<dyn FrameSink>) {
        if self.feed.is_some() {
            log::warn!("Camera feed already started");
            return;
        }
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        self.stop_tx = Some(stop_tx);

        let images = self.images.clone();
        let rotation = self.rotation;
        let interval = self.interval;
        let looping = self.looping;
        let latest = self.latest.clone();
        let delivered = self.delivered.clone();
        let released = self.released.clone();
        let finished = self.finished.clone();

        self.feed = Some(std::thread::spawn(move || {
            let mut sequence = 0usize;
            'feed: loop {
                for image in images.iter() {
                    let shown = Frame::new(
                        image.data().to_vec(),
                        image.width(),
                        image.height(),
                        image.channels(),
                        sequence,
                    );
                    *latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(shown.clone());
                    sink.on_frame(counted_frame(shown, rotation, &released));
                    delivered.fetch_add(1, Ordering::SeqCst);
                    sequence += 1;

                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => break 'feed,
                    }
                }
                if !looping || images.is_empty() {
                    break;
                }
            }
            finished.store(true, Ordering::SeqCst);
            log::debug!("Camera feed finished after {sequence} frame(s)");
        }));
    }

    /// Stops the feed and waits for the delivery thread to exit.
    pub fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.stop_tx.take();
        self.join_feed();
    }

    /// Waits for a non-looping feed to play every image once.
    pub fn wait_until_finished(&mut self) {
        self.join_feed();
    }

    fn join_feed(&mut self) {
        if let Some(handle) = self.feed.take() {
            if handle.join().is_err() {
                log::error!("Camera feed thread panicked");
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn delivered_frames(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }

    /// Frames (live and captured) whose buffers have been returned.
    pub fn released_frames(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl StillCamera for ImageSequenceCamera {
    fn take_picture(&self, on_complete: CaptureCallback) {
        if self.stopped.load(Ordering::SeqCst) {
            on_complete(Err(CaptureError::Stopped));
            return;
        }
        let shown = self
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(image) = shown.or_else(|| self.images.first().cloned()) else {
            on_complete(Err(CaptureError::NoFrame));
            return;
        };
        let frame = counted_frame(image, self.rotation, &self.released);
        std::thread::spawn(move || on_complete(Ok(frame)));
    }
}

impl Drop for ImageSequenceCamera {
    fn drop(&mut self) {
        self.stop();
    }
}

fn counted_frame(image: Frame, rotation: Rotation, released: &Arc<AtomicUsize>) -> CameraFrame {
    let released = released.clone();
    CameraFrame::new(image, rotation).with_release(Box::new(move || {
        released.fetch_add(1, Ordering::SeqCst);
    }))
}

fn decode_rgb(path: &Path, index: usize) -> Result<Frame, CaptureError> {
    let img = image::open(path)
        .map_err(|e| CaptureError::Failed(format!("{}: {e}", path.display())))?
        .to_rgb8();
    let (width, height) = img.dimensions();
    Ok(Frame::new(img.into_raw(), width, height, 3, index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::callback::await_callback;
    use crate::shared::cancellation::CancellationToken;
    use std::path::PathBuf;

    struct CollectingSink {
        frames: Mutex<Vec<(usize, Rotation)>>,
    }

    impl FrameSink for CollectingSink {
        fn on_frame(&self, frame: CameraFrame) {
            self.frames
                .lock()
                .unwrap()
                .push((frame.index(), frame.rotation()));
        }
    }

    fn solid(width: u32, height: u32, value: u8) -> Frame {
        Frame::new(vec![value; (width * height * 3) as usize], width, height, 3, 0)
    }

    fn write_test_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        let mut img = image::RgbImage::new(width, height);
        for pixel in img.pixels_mut() {
            *pixel = image::Rgb([50, 100, 200]);
        }
        img.save(&path).unwrap();
        path
    }

    fn capture(camera: &ImageSequenceCamera) -> Result<CameraFrame, CaptureError> {
        await_callback(&CancellationToken::new(), Duration::from_millis(1), |done| {
            camera.take_picture(done)
        })
        .map_err(|e| match e {
            crate::shared::callback::CallbackError::Failed(e) => e,
            other => CaptureError::Failed(other.to_string()),
        })
    }

    #[test]
    fn test_plays_every_image_once_and_releases_all() {
        let mut camera = ImageSequenceCamera::new(
            vec![solid(4, 2, 1), solid(4, 2, 2), solid(4, 2, 3)],
            Rotation::Deg90,
            0.0,
        );
        let sink = Arc::new(CollectingSink {
            frames: Mutex::new(Vec::new()),
        });

        camera.start(sink.clone());
        camera.wait_until_finished();

        let frames = sink.frames.lock().unwrap().clone();
        assert_eq!(
            frames,
            vec![(0, Rotation::Deg90), (1, Rotation::Deg90), (2, Rotation::Deg90)]
        );
        assert!(camera.is_finished());
        assert_eq!(camera.delivered_frames(), 3);
        assert_eq!(camera.released_frames(), 3);
    }

    #[test]
    fn test_looping_feed_runs_until_stopped() {
        let mut camera =
            ImageSequenceCamera::new(vec![solid(2, 2, 1)], Rotation::Deg0, 1000.0).looping(true);
        let sink = Arc::new(CollectingSink {
            frames: Mutex::new(Vec::new()),
        });

        camera.start(sink.clone());
        while camera.delivered_frames() < 3 {
            std::thread::sleep(Duration::from_millis(1));
        }
        camera.stop();

        assert!(camera.delivered_frames() >= 3);
        assert_eq!(camera.released_frames(), camera.delivered_frames());
    }

    #[test]
    fn test_take_picture_captures_last_shown_frame() {
        let mut camera = ImageSequenceCamera::new(
            vec![solid(3, 1, 10), solid(3, 1, 20)],
            Rotation::Deg270,
            0.0,
        );
        camera.start(Arc::new(CollectingSink {
            frames: Mutex::new(Vec::new()),
        }));
        camera.wait_until_finished();

        let frame = capture(&camera).unwrap();
        assert_eq!(frame.image().data()[0], 20);
        assert_eq!(frame.rotation(), Rotation::Deg270);
        assert_eq!(frame.upright_dimensions(), (1, 3));

        let before = camera.released_frames();
        drop(frame);
        assert_eq!(camera.released_frames(), before + 1);
    }

    #[test]
    fn test_take_picture_before_start_uses_first_image() {
        let camera = ImageSequenceCamera::new(vec![solid(1, 1, 42)], Rotation::Deg0, 30.0);
        let frame = capture(&camera).unwrap();
        assert_eq!(frame.image().data()[0], 42);
    }

    #[test]
    fn test_take_picture_after_stop_fails() {
        let mut camera = ImageSequenceCamera::new(vec![solid(1, 1, 1)], Rotation::Deg0, 30.0);
        camera.stop();
        assert_eq!(capture(&camera).unwrap_err(), CaptureError::Stopped);
    }

    #[test]
    fn test_take_picture_without_images_fails() {
        let camera = ImageSequenceCamera::new(Vec::new(), Rotation::Deg0, 30.0);
        assert_eq!(capture(&camera).unwrap_err(), CaptureError::NoFrame);
    }

    #[test]
    fn test_open_decodes_images_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_test_image(dir.path(), "a.png", 6, 4);
        let b = write_test_image(dir.path(), "b.png", 8, 2);

        let camera = ImageSequenceCamera::open(&[a, b], Rotation::Deg0, 30.0).unwrap();

        assert_eq!(camera.images.len(), 2);
        assert_eq!((camera.images[0].width(), camera.images[0].height()), (6, 4));
        assert_eq!(camera.images[1].index(), 1);
        assert_eq!(&camera.images[0].data()[..3], &[50, 100, 200]);
    }

    #[test]
    fn test_open_missing_file_fails() {
        let result = ImageSequenceCamera::open(&["/nonexistent/frame.png"], Rotation::Deg0, 30.0);
        assert!(matches!(result, Err(CaptureError::Failed(_))));
    }

    #[test]
    fn test_open_empty_list_fails() {
        let paths: [&str; 0] = [];
        let result = ImageSequenceCamera::open(&paths, Rotation::Deg0, 30.0);
        assert!(matches!(result, Err(CaptureError::NoFrame)));
    }
}
