pub const SCHEMA: &str = r#"
-- Scenes: bursts of photos with no idle gap above the threshold
CREATE TABLE IF NOT EXISTS scenes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    unique_identity_count INTEGER NOT NULL DEFAULT 0
);

-- Photos: one row per ingested image
CREATE TABLE IF NOT EXISTS photos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    folder TEXT NOT NULL,
    capture_timestamp TEXT,          -- EXIF capture time, else file mtime; NULL if neither
    upload_timestamp TEXT NOT NULL,  -- when the photo was registered

    -- Pipeline results, written once per scene flush
    processed INTEGER NOT NULL DEFAULT 0,
    scene_id INTEGER,
    detection_count INTEGER,
    unique_identity_count INTEGER,   -- scene-wide peak, not this photo's own count
    detections_blob TEXT,            -- x1,y1,x2,y2,identity_id,class_label;...

    -- EXIF GPS position in decimal degrees, when the camera recorded one
    gps_latitude REAL,
    gps_longitude REAL,

    FOREIGN KEY (scene_id) REFERENCES scenes(id)
);

CREATE INDEX IF NOT EXISTS idx_photos_folder ON photos(folder);
CREATE INDEX IF NOT EXISTS idx_photos_capture ON photos(folder, capture_timestamp);
CREATE INDEX IF NOT EXISTS idx_photos_scene ON photos(scene_id);
"#;
