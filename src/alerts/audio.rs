//! Local audible alarm played alongside each alert.
//!
//! With the `local-audio` feature the alarm runs on a dedicated thread that
//! owns the (non-`Send`) rodio output stream. Without it, requests are logged.

#[cfg(feature = "local-audio")]
pub use engine::{AlarmPlayer, AlarmTone};

#[cfg(feature = "local-audio")]
mod engine {
    use rodio::{OutputStream, Sink, Source};
    use std::f32::consts::PI;
    use std::sync::{
        mpsc::{self, Sender},
        Arc, Mutex,
    };
    use std::thread;
    use std::time::Duration;

    const SAMPLE_RATE: u32 = 44100;
    const BEEP_MS: u32 = 180;
    const GAP_MS: u32 = 70;
    const BEEPS: u32 = 6;

    /// Alternating two-tone beeps, finite.
    pub struct AlarmTone {
        high_freq: f32,
        low_freq: f32,
        num_sample: u32,
        total_samples: u32,
    }

    impl AlarmTone {
        pub fn new() -> Self {
            Self {
                high_freq: 880.0,
                low_freq: 660.0,
                num_sample: 0,
                total_samples: BEEPS * (BEEP_MS + GAP_MS) * SAMPLE_RATE / 1000,
            }
        }
    }

    impl Default for AlarmTone {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Iterator for AlarmTone {
        type Item = f32;

        fn next(&mut self) -> Option<Self::Item> {
            if self.num_sample >= self.total_samples {
                return None;
            }
            let n = self.num_sample;
            self.num_sample += 1;

            let period = (BEEP_MS + GAP_MS) * SAMPLE_RATE / 1000;
            let beep_len = BEEP_MS * SAMPLE_RATE / 1000;
            let beep = n / period;
            if n % period >= beep_len {
                return Some(0.0);
            }

            let freq = if beep % 2 == 0 { self.high_freq } else { self.low_freq };
            let t = n as f32 / SAMPLE_RATE as f32;
            Some((2.0 * PI * freq * t).sin() * 0.3)
        }
    }

    impl Source for AlarmTone {
        fn current_frame_len(&self) -> Option<usize> {
            Some((self.total_samples - self.num_sample) as usize)
        }

        fn channels(&self) -> u16 {
            1
        }

        fn sample_rate(&self) -> u32 {
            SAMPLE_RATE
        }

        fn total_duration(&self) -> Option<Duration> {
            Some(Duration::from_millis(
                (BEEPS * (BEEP_MS + GAP_MS)) as u64,
            ))
        }
    }

    enum AlarmCommand {
        Play,
        Stop,
    }

    pub struct AlarmPlayer {
        tx: Arc<Mutex<Option<Sender<AlarmCommand>>>>,
    }

    impl AlarmPlayer {
        pub fn new() -> Self {
            Self {
                tx: Arc::new(Mutex::new(None)),
            }
        }

        fn ensure_thread(&self) -> Result<Sender<AlarmCommand>, String> {
            let mut slot = self.tx.lock().map_err(|e| e.to_string())?;
            if let Some(tx) = slot.as_ref() {
                return Ok(tx.clone());
            }

            let (tx, rx) = mpsc::channel::<AlarmCommand>();
            thread::Builder::new()
                .name("alarm-audio".to_string())
                .spawn(move || {
                    let mut _stream: Option<OutputStream> = None;
                    let mut sink: Option<Sink> = None;

                    fn ensure_sink(
                        stream: &mut Option<OutputStream>,
                        sink: &mut Option<Sink>,
                    ) -> Result<(), String> {
                        if sink.is_none() {
                            let (s, handle) = OutputStream::try_default()
                                .map_err(|e| format!("Failed to create audio output stream: {}", e))?;
                            let new_sink = Sink::try_new(&handle)
                                .map_err(|e| format!("Failed to create audio sink: {}", e))?;
                            *stream = Some(s);
                            *sink = Some(new_sink);
                        }
                        Ok(())
                    }

                    while let Ok(cmd) = rx.recv() {
                        match cmd {
                            AlarmCommand::Play => {
                                if let Err(err) = ensure_sink(&mut _stream, &mut sink) {
                                    log::warn!("alarm unavailable: {err}");
                                    continue;
                                }
                                if let Some(ref s) = sink {
                                    s.append(AlarmTone::new());
                                    s.play();
                                }
                            }
                            AlarmCommand::Stop => {
                                if let Some(s_old) = sink.take() {
                                    s_old.stop();
                                }
                                _stream = None;
                            }
                        }
                    }
                })
                .map_err(|e| e.to_string())?;

            *slot = Some(tx.clone());
            Ok(tx)
        }

        pub fn play(&self) -> Result<(), String> {
            let tx = self.ensure_thread()?;
            tx.send(AlarmCommand::Play).map_err(|e| e.to_string())
        }

        /// No-op when the alarm thread was never started.
        pub fn stop(&self) -> Result<(), String> {
            let slot = self.tx.lock().map_err(|e| e.to_string())?;
            match slot.as_ref() {
                Some(tx) => tx
                    .send(AlarmCommand::Stop)
                    .map_err(|_| "alarm audio thread has exited".to_string()),
                None => Ok(()),
            }
        }
    }

    impl Default for AlarmPlayer {
        fn default() -> Self {
            Self::new()
        }
    }

}

#[cfg(not(feature = "local-audio"))]
pub use silent::AlarmPlayer;

#[cfg(not(feature = "local-audio"))]
mod silent {
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    pub struct AlarmPlayer {
        warned: AtomicBool,
    }

    impl AlarmPlayer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn play(&self) -> Result<(), String> {
            if !self.warned.swap(true, Ordering::SeqCst) {
                log::warn!("local audio alarm requested but built without the local-audio feature");
            }
            Ok(())
        }

        pub fn stop(&self) -> Result<(), String> {
            Ok(())
        }
    }
}
