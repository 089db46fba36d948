//! Tesseract OCR backend
//!
//! Talks to libtesseract through `leptess::capi`. The high level `LepTess`
//! wrapper always initializes with the default engine mode, and the engine
//! mode can only be chosen at init time, so the base API is driven directly.
//! Only built with the `tesseract` feature since it links against the native
//! Tesseract and Leptonica libraries.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;

use leptess::capi;
use tracing::{debug, info};

use super::ocr::{OcrEngine, OcrEngineFactory, OcrParams, RecognitionResult, Token};
use crate::capture::frame::{PixelBox, PreprocessedFrame};
use crate::error::RecognitionError;

/// Creates one Tesseract instance per recognition
#[derive(Debug, Default)]
pub struct TesseractFactory;

impl OcrEngineFactory for TesseractFactory {
    fn create(&self, params: &OcrParams) -> Result<Box<dyn OcrEngine>, RecognitionError> {
        let tessdata = params
            .tessdata_path
            .as_ref()
            .map(|p| c_string(&p.to_string_lossy()))
            .transpose()?;
        let language = c_string(&params.language)?;

        let engine = TesseractEngine::new()?;
        let datapath = tessdata.as_ref().map_or(ptr::null(), |s| s.as_ptr());

        // SAFETY: `engine.api` is a live handle, the strings outlive the call
        let rc = unsafe {
            capi::TessBaseAPIInit2(
                engine.api,
                datapath,
                language.as_ptr(),
                params.engine_mode as capi::TessOcrEngineMode,
            )
        };
        if rc != 0 {
            return Err(RecognitionError::Init(format!(
                "tesseract init failed for language {:?} (engine mode {})",
                params.language, params.engine_mode
            )));
        }

        engine.set_variable("tessedit_char_whitelist", &params.whitelist)?;
        engine.set_variable("tessedit_pageseg_mode", &params.page_seg_mode.to_string())?;
        engine.set_variable(
            "preserve_interword_spaces",
            if params.preserve_interword_spaces { "1" } else { "0" },
        )?;

        debug!(
            "Tesseract engine created (lang={}, oem={}, psm={})",
            params.language, params.engine_mode, params.page_seg_mode
        );
        Ok(Box::new(engine))
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}

fn c_string(value: &str) -> Result<CString, RecognitionError> {
    CString::new(value).map_err(|_| RecognitionError::Init(format!("{value:?} contains NUL")))
}

/// Owns a `TessBaseAPI` handle for the duration of one recognition
pub struct TesseractEngine {
    api: *mut capi::TessBaseAPI,
}

// The handle is only ever used by the thread currently owning the engine
unsafe impl Send for TesseractEngine {}

impl TesseractEngine {
    fn new() -> Result<Self, RecognitionError> {
        // SAFETY: plain constructor, null checked below
        let api = unsafe { capi::TessBaseAPICreate() };
        if api.is_null() {
            return Err(RecognitionError::Init("failed to create tesseract handle".into()));
        }
        Ok(Self { api })
    }

    fn set_variable(&self, name: &str, value: &str) -> Result<(), RecognitionError> {
        let c_name = c_string(name)?;
        let c_value = c_string(value)?;
        // SAFETY: live handle, strings outlive the call
        let ok = unsafe { capi::TessBaseAPISetVariable(self.api, c_name.as_ptr(), c_value.as_ptr()) };
        if ok == 0 {
            return Err(RecognitionError::Init(format!("failed to set {name}")));
        }
        Ok(())
    }

    /// Words with their boxes, relative to the image handed to Tesseract
    fn words(&self) -> Vec<(String, PixelBox)> {
        let level = capi::TessPageIteratorLevel_RIL_WORD;
        let mut words = Vec::new();

        // SAFETY: called after a successful recognize on a live handle; every
        // returned text is freed with TessDeleteText and the iterator is
        // deleted once. The page iterator is a view into the result iterator.
        unsafe {
            let iter = capi::TessBaseAPIGetIterator(self.api);
            if iter.is_null() {
                return words;
            }
            let page = capi::TessResultIteratorGetPageIterator(iter);

            loop {
                let text = capi::TessResultIteratorGetUTF8Text(iter, level);
                if !text.is_null() {
                    let word = take_text(text);
                    let (mut left, mut top, mut right, mut bottom): (c_int, c_int, c_int, c_int) =
                        (0, 0, 0, 0);
                    let has_box = capi::TessPageIteratorBoundingBox(
                        page,
                        level,
                        &mut left,
                        &mut top,
                        &mut right,
                        &mut bottom,
                    ) != 0;
                    if has_box && !word.is_empty() {
                        words.push((
                            word,
                            PixelBox::new(left as f64, top as f64, right as f64, bottom as f64),
                        ));
                    }
                }
                if capi::TessResultIteratorNext(iter, level) == 0 {
                    break;
                }
            }

            capi::TessResultIteratorDelete(iter);
        }

        words
    }
}

/// Copy a Tesseract-owned string and free it
///
/// # Safety
/// `text` must be a non-null string returned by the Tesseract C API.
unsafe fn take_text(text: *mut c_char) -> String {
    let owned = CStr::from_ptr(text).to_string_lossy().trim().to_string();
    capi::TessDeleteText(text);
    owned
}

impl Drop for TesseractEngine {
    fn drop(&mut self) {
        // SAFETY: handle created by TessBaseAPICreate and released only here
        unsafe {
            capi::TessBaseAPIEnd(self.api);
            capi::TessBaseAPIDelete(self.api);
        }
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(
        &mut self,
        frame: &PreprocessedFrame,
        roi: PixelBox,
    ) -> Result<RecognitionResult, RecognitionError> {
        let (x, y) = (roi.x0 as u32, roi.y0 as u32);
        let (w, h) = (roi.width() as u32, roi.height() as u32);
        if w == 0 || h == 0 {
            return Ok(RecognitionResult::default());
        }

        let crop = crop_rgba(frame, x, y, w, h);
        if crop.len() != (w * h * 4) as usize {
            return Err(RecognitionError::Engine("region outside frame".into()));
        }

        // SAFETY: `crop` stays alive until recognition and text extraction
        // below are done
        let text = unsafe {
            capi::TessBaseAPISetImage(
                self.api,
                crop.as_ptr(),
                w as c_int,
                h as c_int,
                4,
                (w * 4) as c_int,
            );
            if capi::TessBaseAPIRecognize(self.api, ptr::null_mut()) != 0 {
                return Err(RecognitionError::Engine("recognition failed".into()));
            }
            let raw = capi::TessBaseAPIGetUTF8Text(self.api);
            if raw.is_null() {
                String::new()
            } else {
                take_text(raw)
            }
        };

        let tokens: Vec<Token> = self
            .words()
            .into_iter()
            .map(|(text, bbox)| Token {
                text,
                bbox: bbox.translate(x as f64, y as f64),
            })
            .collect();

        info!("Tesseract read {} words", tokens.len());
        Ok(RecognitionResult { text, tokens })
    }
}

/// Copy a rectangle out of RGBA data
fn crop_rgba(frame: &PreprocessedFrame, x: u32, y: u32, width: u32, height: u32) -> Vec<u8> {
    let img_width = frame.width();
    let data = frame.data();
    let mut region = Vec::with_capacity((width * height * 4) as usize);

    for row in y..(y + height) {
        let start = ((row * img_width + x) * 4) as usize;
        let end = start + (width * 4) as usize;
        if end <= data.len() {
            region.extend_from_slice(&data[start..end]);
        }
    }

    region
}
