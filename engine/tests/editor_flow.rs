use image::{Rgba, RgbaImage};
use photo_engine::app_state::AppState;
use photo_engine::backend::{RunAction, RunOutput};
use photo_engine::events::CanvasEvent;
use photo_engine::raster::{encode_png, png_data_url, rgba_to_pixmap};
use photo_engine::scene::LayerMove;
use photo_engine::settings::MemoryStore;
use photo_engine::{Editor, EngineError, Interaction, Tool, ViewMode};

fn png(width: u32, height: u32, rgba: [u8; 4]) -> String {
    let img = RgbaImage::from_pixel(width, height, Rgba(rgba));
    png_data_url(&encode_png(&rgba_to_pixmap(img).unwrap()).unwrap())
}

fn bare_base64(data_url: &str) -> String {
    data_url.split_once(";base64,").unwrap().1.to_string()
}

fn editor() -> Editor {
    Editor::with_state(AppState::default(), Box::new(MemoryStore::default()), 1280.0, 1024.0)
}

fn stroke_across(ed: &mut Editor) {
    let overlay = ed.frame_overlay();
    let center = overlay.center();
    ed.set_tool(Tool::Draw);
    for event in [
        CanvasEvent::MouseDown { x: center.x - 80.0, y: center.y, pan: false },
        CanvasEvent::MouseMove { x: center.x, y: center.y + 10.0 },
        CanvasEvent::MouseUp { x: center.x + 80.0, y: center.y },
    ] {
        ed.handle_event(event).unwrap();
    }
    ed.set_tool(Tool::Select);
}

#[test]
fn inpaint_round_trip_then_undo_and_redo() {
    let mut ed = editor();
    ed.load_image(&png(640, 480, [30, 60, 90, 255])).unwrap();
    assert!(!ed.can_undo());

    stroke_across(&mut ed);
    assert!(ed.can_undo());
    let with_mask = ed.scene().clone();

    let request = ed.begin_run(RunAction::Inpaint).unwrap().expect("run should start");
    assert!(ed.is_processing());
    assert_eq!(request.endpoint, "/inpaint");

    // a second trigger while the first is out changes nothing
    assert!(ed.begin_run(RunAction::Inpaint).unwrap().is_none());
    assert_eq!(ed.scene(), &with_mask);

    let output = RunOutput { image: Some(bare_base64(&png(1024, 1024, [250, 250, 0, 255]))), result: vec![] };
    let ids = ed.complete_run(request.ticket, output).unwrap();
    assert_eq!(ids.len(), 1);
    assert!(!ed.is_processing());
    assert_eq!(ed.renders().len(), 1);
    assert!(ed.scene().objects().iter().all(|o| !o.is_path()));
    assert!(ed.strokes().open_stroke().is_none());

    assert!(ed.undo().unwrap());
    assert_eq!(ed.scene(), &with_mask);
    assert!(ed.redo().unwrap());
    assert!(ed.scene().get(ids[0]).is_some());
}

#[test]
fn empty_mask_never_reaches_the_backend() {
    let mut ed = editor();
    ed.load_image(&png(64, 64, [1, 2, 3, 255])).unwrap();
    let err = ed.begin_run(RunAction::Inpaint).unwrap_err();
    assert!(matches!(err, EngineError::EmptyMaskSubmission));
    assert!(!ed.is_processing());
    assert!(ed.pending_run().is_none());
    assert_eq!(ed.take_notifications().len(), 1);
    assert!(ed.take_notifications().is_empty());
}

#[test]
fn run_without_photo_reports_missing_image() {
    let mut ed = editor();
    let err = ed.begin_run(RunAction::Render).unwrap_err();
    assert!(matches!(err, EngineError::MissingBaseImage));
    assert!(!ed.is_processing());
}

#[test]
fn failed_run_leaves_history_alone() {
    let mut ed = editor();
    ed.load_image(&png(64, 64, [1, 2, 3, 255])).unwrap();
    let before = ed.scene().clone();
    let request = ed.begin_run(RunAction::Render).unwrap().unwrap();
    ed.fail_run(request.ticket, &EngineError::BackendUnreachable("connection reset".into())).unwrap();
    assert!(!ed.is_processing());
    assert!(!ed.can_undo());
    assert_eq!(ed.scene(), &before);

    // delete is available again once the run is resolved
    let id = ed.add_image(&png(8, 8, [9, 9, 9, 255])).unwrap();
    ed.select(Some(id));
    assert!(ed.delete_selected().unwrap());
}

#[test]
fn delete_is_blocked_while_processing() {
    let mut ed = editor();
    ed.load_image(&png(64, 64, [1, 2, 3, 255])).unwrap();
    let id = ed.add_image(&png(8, 8, [9, 9, 9, 255])).unwrap();
    ed.begin_run(RunAction::Render).unwrap().unwrap();
    ed.select(Some(id));
    assert!(!ed.delete_selected().unwrap());
    assert!(ed.scene().get(id).is_some());
}

#[test]
fn crop_and_restack_an_added_layer() {
    let mut ed = editor();
    let base = ed.load_image(&png(64, 64, [1, 2, 3, 255])).unwrap();
    let layer = ed.add_image(&png(200, 100, [200, 10, 10, 255])).unwrap();

    ed.select(Some(layer));
    ed.begin_crop().unwrap();
    assert!(matches!(ed.interaction(), Interaction::Cropping { .. }));
    // runs wait for the crop to finish
    assert!(ed.begin_run(RunAction::Render).unwrap().is_none());
    let cropped = ed.apply_crop().unwrap();
    assert_eq!(ed.scene().len(), 2);

    ed.select(Some(cropped));
    assert!(ed.move_selected(LayerMove::ToBack).unwrap());
    assert_eq!(ed.scene().objects()[0].id, cropped);
    assert_eq!(ed.scene().objects()[1].id, base);
    assert_eq!(ed.selection(), None);
}

#[test]
fn view_mode_routes_layers_between_artifacts() {
    let mut ed = editor();
    ed.load_image(&png(64, 64, [1, 2, 3, 255])).unwrap();
    let layer = ed.add_image(&png(32, 32, [0, 255, 0, 255])).unwrap();
    ed.set_view_mode(layer, ViewMode::Fixed).unwrap();

    let json = ed.get_scene_json();
    let reloaded = photo_engine::scene::Scene::deserialize(&json).unwrap();
    assert_eq!(reloaded.get(layer).unwrap().view_mode, ViewMode::Fixed);

    assert!(ed.undo().unwrap());
    assert_eq!(ed.scene().get(layer).unwrap().view_mode, ViewMode::Unset);
}
