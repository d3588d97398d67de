use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::Serialize;
use thiserror::Error;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed xml: {0}")]
    Xml(String),
    #[error("document is not a gpx file")]
    NotGpx,
    #[error("track point is missing the '{0}' attribute")]
    MissingAttribute(&'static str),
    #[error("invalid number in '{field}': {value}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("coordinate out of range: lat {lat}, lon {lon}")]
    CoordinateOutOfRange { lat: f64, lon: f64 },
}

impl From<quick_xml::Error> for ParseError {
    fn from(e: quick_xml::Error) -> Self {
        Self::Xml(e.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ele: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ElevationSummary {
    pub min: f64,
    pub max: f64,
    pub gain: f64,
    pub loss: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Track {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub points: Vec<TrackPoint>,
    pub distance_m: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elevation: Option<ElevationSummary>,
}

/// Converts raw track-log bytes into structured tracks.
pub trait TrackParser: Send + Sync {
    fn parse(&self, raw: &[u8]) -> Result<Vec<Track>, ParseError>;
}

/// GPX 1.0/1.1 parser. Only `<trk>` elements are extracted; waypoints and
/// routes are ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct GpxParser;

impl TrackParser for GpxParser {
    fn parse(&self, raw: &[u8]) -> Result<Vec<Track>, ParseError> {
        parse_gpx(raw)
    }
}

#[derive(Default)]
struct ParseState {
    stack: Vec<Vec<u8>>,
    text: String,
    tracks: Vec<Track>,
    track: Option<Track>,
    point: Option<TrackPoint>,
}

impl ParseState {
    fn open(&mut self, element: &BytesStart<'_>) -> Result<(), ParseError> {
        let name = element.local_name().as_ref().to_vec();

        if self.stack.is_empty() && name != b"gpx" {
            return Err(ParseError::NotGpx);
        }

        match name.as_slice() {
            b"trk" => self.track = Some(Track::default()),
            b"trkpt" if self.track.is_some() => self.point = Some(read_point(element)?),
            _ => {}
        }

        self.stack.push(name);
        self.text.clear();
        Ok(())
    }

    fn close(&mut self) -> Result<(), ParseError> {
        let Some(name) = self.stack.pop() else {
            return Ok(());
        };
        let text = std::mem::take(&mut self.text);
        let text = text.trim();

        match name.as_slice() {
            b"trkpt" => {
                if let (Some(track), Some(point)) = (self.track.as_mut(), self.point.take()) {
                    track.points.push(point);
                }
            }
            b"trk" => {
                if let Some(mut track) = self.track.take() {
                    summarize(&mut track);
                    self.tracks.push(track);
                }
            }
            b"ele" => {
                if let Some(point) = self.point.as_mut() {
                    point.ele = Some(parse_number("ele", text)?);
                }
            }
            b"time" => {
                if let Some(point) = self.point.as_mut() {
                    point.time = Some(text.to_string());
                }
            }
            field @ (b"name" | b"desc" | b"type") => {
                let parent_is_track = self.stack.last().is_some_and(|p| p == b"trk");
                if let (true, Some(track)) = (parent_is_track, self.track.as_mut()) {
                    let value = Some(text.to_string());
                    match field {
                        b"name" => track.name = value,
                        b"desc" => track.desc = value,
                        _ => track.kind = value,
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }
}

/// Parses a GPX document into its tracks.
pub fn parse_gpx(raw: &[u8]) -> Result<Vec<Track>, ParseError> {
    let mut reader = Reader::from_reader(raw);
    reader.config_mut().trim_text(true);

    let mut state = ParseState::default();
    let mut seen_root = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                state.open(&e)?;
                seen_root = true;
            }
            Event::Empty(e) => {
                state.open(&e)?;
                state.close()?;
                seen_root = true;
            }
            Event::End(_) => state.close()?,
            Event::Text(t) => {
                let text = t.unescape()?;
                state.text.push_str(&text);
            }
            Event::CData(c) => {
                state.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !seen_root {
        return Err(ParseError::NotGpx);
    }
    if !state.stack.is_empty() {
        return Err(ParseError::Xml("unexpected end of document".to_string()));
    }

    Ok(state.tracks)
}

fn read_point(element: &BytesStart<'_>) -> Result<TrackPoint, ParseError> {
    let mut lat = None;
    let mut lon = None;

    for attr in element.attributes() {
        let attr = attr.map_err(|e| ParseError::Xml(e.to_string()))?;
        let value = attr.unescape_value()?;
        match attr.key.local_name().as_ref() {
            b"lat" => lat = Some(parse_number("lat", &value)?),
            b"lon" => lon = Some(parse_number("lon", &value)?),
            _ => {}
        }
    }

    let lat = lat.ok_or(ParseError::MissingAttribute("lat"))?;
    let lon = lon.ok_or(ParseError::MissingAttribute("lon"))?;

    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(ParseError::CoordinateOutOfRange { lat, lon });
    }

    Ok(TrackPoint {
        lat,
        lon,
        ..TrackPoint::default()
    })
}

fn parse_number(field: &'static str, value: &str) -> Result<f64, ParseError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ParseError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}

fn summarize(track: &mut Track) {
    track.distance_m = track
        .points
        .windows(2)
        .map(|pair| haversine_m(&pair[0], &pair[1]))
        .sum();

    let elevations: Vec<f64> = track.points.iter().filter_map(|p| p.ele).collect();
    if elevations.is_empty() {
        return;
    }

    let mut summary = ElevationSummary {
        min: f64::INFINITY,
        max: f64::NEG_INFINITY,
        gain: 0.0,
        loss: 0.0,
    };
    for ele in &elevations {
        summary.min = summary.min.min(*ele);
        summary.max = summary.max.max(*ele);
    }
    for pair in elevations.windows(2) {
        let delta = pair[1] - pair[0];
        if delta > 0.0 {
            summary.gain += delta;
        } else {
            summary.loss -= delta;
        }
    }

    track.elevation = Some(summary);
}

fn haversine_m(a: &TrackPoint, b: &TrackPoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <metadata><name>Not a track name</name></metadata>
  <wpt lat="1.0" lon="1.0"><name>Waypoint</name></wpt>
  <trk>
    <name>Morning &amp; Ride</name>
    <desc><![CDATA[Loop <fast>]]></desc>
    <type>cycling</type>
    <trkseg>
      <trkpt lat="0.0" lon="0.0"><ele>100</ele><time>2024-05-01T08:00:00Z</time></trkpt>
      <trkpt lat="0.0" lon="1.0"><ele>150</ele></trkpt>
    </trkseg>
    <trkseg>
      <trkpt lat="1.0" lon="1.0"><ele>120</ele></trkpt>
    </trkseg>
  </trk>
  <trk>
    <trkseg><trkpt lat="45.5" lon="-73.5"/></trkseg>
  </trk>
</gpx>"#;

    #[test]
    fn test_parses_tracks() {
        let tracks = GpxParser.parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(tracks.len(), 2);

        let first = &tracks[0];
        assert_eq!(first.name.as_deref(), Some("Morning & Ride"));
        assert_eq!(first.desc.as_deref(), Some("Loop <fast>"));
        assert_eq!(first.kind.as_deref(), Some("cycling"));
        assert_eq!(first.points.len(), 3);
        assert_eq!(first.points[0].time.as_deref(), Some("2024-05-01T08:00:00Z"));
        assert_eq!(first.points[1].ele, Some(150.0));

        let second = &tracks[1];
        assert!(second.name.is_none());
        assert_eq!(second.points.len(), 1);
        assert_eq!(second.points[0].lat, 45.5);
        assert_eq!(second.distance_m, 0.0);
        assert!(second.elevation.is_none());
    }

    #[test]
    fn test_distance_and_elevation() {
        let tracks = parse_gpx(SAMPLE.as_bytes()).unwrap();
        let track = &tracks[0];

        // Two one-degree legs, roughly 111.2 km each.
        assert!((track.distance_m - 222_390.0).abs() < 100.0, "{}", track.distance_m);

        let elevation = track.elevation.as_ref().unwrap();
        assert_eq!(elevation.min, 100.0);
        assert_eq!(elevation.max, 150.0);
        assert_eq!(elevation.gain, 50.0);
        assert_eq!(elevation.loss, 30.0);
    }

    #[test]
    fn test_document_without_tracks() {
        let tracks = parse_gpx(b"<gpx version=\"1.1\"></gpx>").unwrap();
        assert!(tracks.is_empty());
    }

    #[test]
    fn test_rejects_non_gpx() {
        assert!(matches!(parse_gpx(b""), Err(ParseError::NotGpx)));
        assert!(matches!(
            parse_gpx(b"<kml><Document/></kml>"),
            Err(ParseError::NotGpx)
        ));
        assert!(matches!(
            parse_gpx(b"just some text"),
            Err(ParseError::NotGpx)
        ));
    }

    #[test]
    fn test_rejects_malformed_xml() {
        assert!(matches!(
            parse_gpx(b"<gpx><trk></gpx>"),
            Err(ParseError::Xml(_))
        ));
        assert!(matches!(
            parse_gpx(b"<gpx><trk>"),
            Err(ParseError::Xml(_))
        ));
    }

    #[test]
    fn test_rejects_bad_points() {
        assert!(matches!(
            parse_gpx(b"<gpx><trk><trkseg><trkpt lon=\"1\"/></trkseg></trk></gpx>"),
            Err(ParseError::MissingAttribute("lat"))
        ));
        assert!(matches!(
            parse_gpx(b"<gpx><trk><trkseg><trkpt lat=\"abc\" lon=\"1\"/></trkseg></trk></gpx>"),
            Err(ParseError::InvalidNumber { field: "lat", .. })
        ));
        assert!(matches!(
            parse_gpx(b"<gpx><trk><trkseg><trkpt lat=\"91\" lon=\"1\"/></trkseg></trk></gpx>"),
            Err(ParseError::CoordinateOutOfRange { .. })
        ));
    }

    #[test]
    fn test_serializes_type_field() {
        let tracks = parse_gpx(SAMPLE.as_bytes()).unwrap();
        let json = serde_json::to_value(&tracks[0]).unwrap();
        assert_eq!(json["type"], "cycling");
        assert!(json.get("kind").is_none());
    }
}
