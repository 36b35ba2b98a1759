use url::Url;

use crate::net::Response;

/// Page shown for a navigation when neither the cache nor the network can
/// answer.
const OFFLINE_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Time Tracker - Offline</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <style>
        body {
            font-family: 'Segoe UI', sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            background: linear-gradient(135deg, #2563eb, #1d4ed8);
            color: white;
            text-align: center;
        }
        .offline-container {
            max-width: 400px;
            padding: 2rem;
        }
        .icon {
            font-size: 4rem;
            margin-bottom: 1rem;
        }
        .btn {
            background: white;
            color: #2563eb;
            padding: 0.75rem 1.5rem;
            border: none;
            border-radius: 8px;
            font-weight: 600;
            cursor: pointer;
            margin-top: 1rem;
        }
    </style>
</head>
<body>
    <div class="offline-container">
        <div class="icon">&#128241;</div>
        <h2>You're Offline</h2>
        <p>Time Tracker is not available right now. Check your internet connection and try again.</p>
        <button class="btn" onclick="window.location.reload()">Try Again</button>
    </div>
</body>
</html>
"#;

/// Synthesize the offline document for a failed navigation to `url`.
pub fn offline_document(url: &Url) -> Response {
  Response::new(200, url.clone(), OFFLINE_PAGE).with_header("content-type", "text/html")
}
